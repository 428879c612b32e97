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

use super::NativeAffinity;
use super::ProcessMasks;
use crate::AffinityMask;
use crate::NativeErrorCode;

/// Reported by every affinity call on targets without an implementation.
const UNSUPPORTED: NativeErrorCode = -1;

/// Placeholder backend for targets without a native affinity model, every
/// query and mutation fails.
#[derive(Copy, Clone, Debug, Default)]
pub struct OsAffinity;

impl NativeAffinity for OsAffinity {
    type Thread = ();
    type Process = ();

    fn processor_count(&self) -> usize {
        1
    }

    fn current_processor(&self) -> Result<usize, NativeErrorCode> {
        Err(UNSUPPORTED)
    }

    fn current_thread(&self) -> Self::Thread {}

    fn current_process(&self) -> Self::Process {}

    fn set_thread_affinity(
        &self,
        _thread: Self::Thread,
        _mask: AffinityMask,
    ) -> Result<AffinityMask, NativeErrorCode> {
        Err(UNSUPPORTED)
    }

    fn get_process_affinity(
        &self,
        _process: Self::Process,
    ) -> Result<ProcessMasks, NativeErrorCode> {
        Err(UNSUPPORTED)
    }

    fn set_process_affinity(
        &self,
        _process: Self::Process,
        _mask: AffinityMask,
    ) -> Result<(), NativeErrorCode> {
        Err(UNSUPPORTED)
    }

    fn open_process(&self, _pid: u32) -> Result<Self::Process, NativeErrorCode> {
        Err(UNSUPPORTED)
    }

    fn close_process(&self, _process: Self::Process) -> bool {
        true
    }
}
