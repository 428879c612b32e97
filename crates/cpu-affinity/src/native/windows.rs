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

use std::mem;

use once_cell::sync::Lazy;
use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::SystemInformation::GetSystemInfo;
use windows_sys::Win32::System::SystemInformation::SYSTEM_INFO;
use windows_sys::Win32::System::Threading::GetCurrentProcess;
use windows_sys::Win32::System::Threading::GetCurrentProcessorNumber;
use windows_sys::Win32::System::Threading::GetCurrentThread;
use windows_sys::Win32::System::Threading::GetProcessAffinityMask;
use windows_sys::Win32::System::Threading::OpenProcess;
use windows_sys::Win32::System::Threading::SetProcessAffinityMask;
use windows_sys::Win32::System::Threading::SetThreadAffinityMask;
use windows_sys::Win32::System::Threading::PROCESS_QUERY_LIMITED_INFORMATION;
use windows_sys::Win32::System::Threading::PROCESS_SET_INFORMATION;

use super::NativeAffinity;
use super::ProcessMasks;
use crate::bitmask;
use crate::AffinityMask;
use crate::NativeErrorCode;

static PROCESSOR_COUNT: Lazy<usize> = Lazy::new(|| {
    // safety: SYSTEM_INFO is a POD type, GetSystemInfo fills it in and can't fail
    let mut info: SYSTEM_INFO = unsafe { mem::zeroed() };
    unsafe { GetSystemInfo(&mut info) };

    (info.dwNumberOfProcessors as usize).clamp(1, bitmask::MASK_BITS)
});

/// Windows affinity for the processor group of the calling process.
#[derive(Copy, Clone, Debug, Default)]
pub struct OsAffinity;

impl NativeAffinity for OsAffinity {
    type Thread = HANDLE;
    type Process = HANDLE;

    fn processor_count(&self) -> usize {
        *PROCESSOR_COUNT
    }

    fn current_processor(&self) -> Result<usize, NativeErrorCode> {
        // safety: no preconditions
        Ok(unsafe { GetCurrentProcessorNumber() } as usize)
    }

    fn current_thread(&self) -> Self::Thread {
        // safety: returns a pseudo handle which must not be closed
        unsafe { GetCurrentThread() }
    }

    fn current_process(&self) -> Self::Process {
        // safety: returns a pseudo handle which must not be closed
        unsafe { GetCurrentProcess() }
    }

    fn set_thread_affinity(
        &self,
        thread: Self::Thread,
        mask: AffinityMask,
    ) -> Result<AffinityMask, NativeErrorCode> {
        // safety: thread is a live handle with THREAD_SET_INFORMATION access
        let previous = unsafe { SetThreadAffinityMask(thread, mask) };
        if previous == 0 {
            return Err(last_error());
        }

        Ok(previous)
    }

    fn get_process_affinity(
        &self,
        process: Self::Process,
    ) -> Result<ProcessMasks, NativeErrorCode> {
        let mut process_mask: usize = 0;
        let mut system_mask: usize = 0;

        // safety: both out pointers reference live locals
        let ok = unsafe { GetProcessAffinityMask(process, &mut process_mask, &mut system_mask) };
        if ok == 0 {
            return Err(last_error());
        }

        Ok(ProcessMasks {
            process: process_mask,
            system: system_mask,
        })
    }

    fn set_process_affinity(
        &self,
        process: Self::Process,
        mask: AffinityMask,
    ) -> Result<(), NativeErrorCode> {
        // safety: process is a live handle with PROCESS_SET_INFORMATION access
        let ok = unsafe { SetProcessAffinityMask(process, mask) };
        if ok == 0 {
            return Err(last_error());
        }

        Ok(())
    }

    fn open_process(&self, pid: u32) -> Result<Self::Process, NativeErrorCode> {
        let access = PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_SET_INFORMATION;

        // safety: no preconditions, a null handle signals failure
        let handle = unsafe { OpenProcess(access, 0, pid) };
        if handle.is_null() {
            return Err(last_error());
        }

        Ok(handle)
    }

    fn close_process(&self, process: Self::Process) -> bool {
        // safety: process came from OpenProcess and is closed only once
        unsafe { CloseHandle(process) != 0 }
    }
}

fn last_error() -> NativeErrorCode {
    // safety: no preconditions
    unsafe { GetLastError() as NativeErrorCode }
}
