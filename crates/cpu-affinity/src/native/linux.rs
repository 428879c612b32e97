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

use std::fs;
use std::mem;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use once_cell::sync::Lazy;

use super::NativeAffinity;
use super::ProcessMasks;
use crate::bitmask;
use crate::AffinityMask;
use crate::NativeErrorCode;

/// Processor count is read once, affinity masks can't address more than `MASK_BITS` cpus.
static PROCESSOR_COUNT: Lazy<usize> = Lazy::new(|| configured_processors().min(bitmask::MASK_BITS));

/// Linux affinity backed by `sched_getaffinity(2)` and `sched_setaffinity(2)`.
///
/// The kernel keeps one mask per task, so a process mask is read from the main
/// thread and written to every thread listed in `/proc/<pid>/task`. Unlike Windows,
/// Linux does not cap a thread mask by its process mask, so thread requests
/// outside the process set are accepted as long as they name an online cpu.
#[derive(Copy, Clone, Debug, Default)]
pub struct OsAffinity;

impl NativeAffinity for OsAffinity {
    /// Kernel task id, `0` addresses the calling thread.
    type Thread = libc::pid_t;
    type Process = libc::pid_t;

    fn processor_count(&self) -> usize {
        *PROCESSOR_COUNT
    }

    fn current_processor(&self) -> Result<usize, NativeErrorCode> {
        // safety: sched_getcpu has no preconditions
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            return Err(Errno::last() as NativeErrorCode);
        }

        Ok(cpu as usize)
    }

    fn current_thread(&self) -> Self::Thread {
        0
    }

    fn current_process(&self) -> Self::Process {
        std::process::id() as libc::pid_t
    }

    fn set_thread_affinity(
        &self,
        thread: Self::Thread,
        mask: AffinityMask,
    ) -> Result<AffinityMask, NativeErrorCode> {
        let previous = get_task_affinity(thread)?;
        set_task_affinity(thread, mask)?;
        Ok(previous)
    }

    fn get_process_affinity(
        &self,
        process: Self::Process,
    ) -> Result<ProcessMasks, NativeErrorCode> {
        let process_mask = get_task_affinity(process)?;

        Ok(ProcessMasks {
            process: process_mask,
            system: bitmask::system_mask(self.processor_count()),
        })
    }

    fn set_process_affinity(
        &self,
        process: Self::Process,
        mask: AffinityMask,
    ) -> Result<(), NativeErrorCode> {
        for task in process_tasks(process)? {
            match set_task_affinity(task, mask) {
                // the thread exited after the task list was read
                Err(code) if code == Errno::ESRCH as NativeErrorCode && task != process => {}
                result => result?,
            }
        }

        Ok(())
    }

    fn open_process(&self, pid: u32) -> Result<Self::Process, NativeErrorCode> {
        let raw_pid = libc::pid_t::try_from(pid).map_err(|_| Errno::EINVAL as NativeErrorCode)?;
        if raw_pid == 0 {
            return Err(Errno::ESRCH as NativeErrorCode);
        }

        // a signal-less kill only probes that the process exists,
        // EPERM means it does but belongs to another user
        match kill(Pid::from_raw(raw_pid), None) {
            Ok(()) | Err(Errno::EPERM) => Ok(raw_pid),
            Err(errno) => Err(errno as NativeErrorCode),
        }
    }

    fn close_process(&self, _process: Self::Process) -> bool {
        // pids don't hold kernel resources
        true
    }
}

fn get_task_affinity(task: libc::pid_t) -> Result<AffinityMask, NativeErrorCode> {
    // safety: cpu_set_t is a POD type, zero-initialization is standard
    let mut cpu_set: libc::cpu_set_t = unsafe { mem::zeroed() };

    // safety: cpu_set points to a live cpu_set_t of the passed size
    let result = unsafe {
        libc::sched_getaffinity(task, mem::size_of::<libc::cpu_set_t>(), &mut cpu_set)
    };
    if result != 0 {
        return Err(Errno::last() as NativeErrorCode);
    }

    mask_from_cpu_set(&cpu_set)
}

/// Folds the cpus a single mask can address, a set allowing only cpus past
/// `MASK_BITS` fails with `EOVERFLOW` since it can't be represented.
fn mask_from_cpu_set(cpu_set: &libc::cpu_set_t) -> Result<AffinityMask, NativeErrorCode> {
    // safety: every index is below CPU_SETSIZE
    let is_set = |cpu: usize| unsafe { libc::CPU_ISSET(cpu, cpu_set) };

    let mask = (0..bitmask::MASK_BITS)
        .filter(|&cpu| is_set(cpu))
        .fold(0, |mask, cpu| mask | (1 << cpu));
    let dropped = (bitmask::MASK_BITS..libc::CPU_SETSIZE as usize)
        .filter(|&cpu| is_set(cpu))
        .count();

    if dropped > 0 {
        if mask == 0 {
            log::warn!("affinity only allows cpus beyond the first {}", bitmask::MASK_BITS);
            return Err(Errno::EOVERFLOW as NativeErrorCode);
        }
        log::warn!("affinity ignores {dropped} cpus beyond the first {}", bitmask::MASK_BITS);
    }

    Ok(mask)
}

fn set_task_affinity(task: libc::pid_t, mask: AffinityMask) -> Result<(), NativeErrorCode> {
    // safety: cpu_set_t is a POD type, zero-initialization is standard
    let mut cpu_set: libc::cpu_set_t = unsafe { mem::zeroed() };
    for cpu in bitmask::decode(mask) {
        // safety: decoded ids are below MASK_BITS and so below CPU_SETSIZE
        unsafe { libc::CPU_SET(cpu.bit_index(), &mut cpu_set) };
    }

    // safety: cpu_set points to a live cpu_set_t of the passed size
    let result =
        unsafe { libc::sched_setaffinity(task, mem::size_of::<libc::cpu_set_t>(), &cpu_set) };
    if result != 0 {
        return Err(Errno::last() as NativeErrorCode);
    }

    log::trace!("task {task} affinity set to {mask:#x}");
    Ok(())
}

fn process_tasks(process: libc::pid_t) -> Result<Vec<libc::pid_t>, NativeErrorCode> {
    let io_code = |error: std::io::Error| error.raw_os_error().unwrap_or(Errno::EIO as i32);

    let mut tasks = fs::read_dir(format!("/proc/{process}/task"))
        .map_err(io_code)?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<libc::pid_t>().ok())
        .collect::<Vec<_>>();

    // the main thread goes first so a rejected mask fails before anything changed
    tasks.sort_unstable_by_key(|&task| task != process);
    Ok(tasks)
}

fn configured_processors() -> usize {
    // safety: sysconf has no preconditions
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if count <= 0 {
        log::warn!("sysconf(_SC_NPROCESSORS_CONF) failed, assuming a single processor");
        return 1;
    }

    count as usize
}
