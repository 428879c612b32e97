/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use newtype_derive::newtype_fmt;
use serde::Deserialize;
use serde::Serialize;

pub type CpuIdType = u32;

/// Native affinity bitmask, bit `i` set means logical CPU `i` is allowed.
pub type AffinityMask = usize;

/// An opaque type that represents a logical CPU as seen by the OS scheduler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct CpuId(CpuIdType);

newtype_derive::NewtypeFrom! { () pub struct CpuId(CpuIdType); }
newtype_derive::NewtypeDisplay! { () pub struct CpuId(CpuIdType); }

impl CpuId {
    pub const fn new(cpu_id: CpuIdType) -> Self {
        Self(cpu_id)
    }

    /// Position of this CPU in an affinity bitmask.
    pub const fn bit_index(self) -> usize {
        self.0 as usize
    }
}

impl From<CpuId> for usize {
    fn from(value: CpuId) -> usize {
        value.0 as usize
    }
}
