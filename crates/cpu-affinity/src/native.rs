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

//! The boundary between this crate and the OS affinity facilities.
//!
//! Every query and mutation goes through [`NativeAffinity`], so the same operations
//! run against [`OsAffinity`] on a real host and against
//! [`SimulatedAffinity`](crate::simulated::SimulatedAffinity) in tests.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(any(target_os = "linux", windows)))]
mod other;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::OsAffinity;
#[cfg(not(any(target_os = "linux", windows)))]
pub use other::OsAffinity;
#[cfg(windows)]
pub use windows::OsAffinity;

use std::fmt::Debug;

use crate::AffinityMask;
use crate::NativeErrorCode;

/// Affinity masks reported for a process by a single native call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProcessMasks {
    pub process: AffinityMask,
    pub system: AffinityMask,
}

pub trait NativeAffinity {
    /// Raw thread handle. Only the calling thread's pseudo handle is ever produced.
    type Thread: Copy + Debug;

    /// Raw process handle, either the calling process's pseudo handle
    /// or one obtained from [`NativeAffinity::open_process`].
    type Process: Copy + Debug;

    /// Number of logical processors, never more than a mask can describe.
    fn processor_count(&self) -> usize;

    /// The processor the calling thread is running on right now.
    fn current_processor(&self) -> Result<usize, NativeErrorCode>;

    fn current_thread(&self) -> Self::Thread;

    fn current_process(&self) -> Self::Process;

    /// Applies `mask` to `thread` and returns the mask that was in effect before.
    fn set_thread_affinity(
        &self,
        thread: Self::Thread,
        mask: AffinityMask,
    ) -> Result<AffinityMask, NativeErrorCode>;

    fn get_process_affinity(&self, process: Self::Process)
        -> Result<ProcessMasks, NativeErrorCode>;

    fn set_process_affinity(
        &self,
        process: Self::Process,
        mask: AffinityMask,
    ) -> Result<(), NativeErrorCode>;

    fn open_process(&self, pid: u32) -> Result<Self::Process, NativeErrorCode>;

    /// Releases a handle returned by [`NativeAffinity::open_process`].
    /// Must never be called with the pseudo handle of the current process.
    fn close_process(&self, process: Self::Process) -> bool;
}
