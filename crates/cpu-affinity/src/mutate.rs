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

//! Operations changing thread and process affinity.
//!
//! Cpu ids are always encoded before the OS is called, so an invalid request never
//! leaves a partially applied mask behind.

use crate::bitmask;
use crate::query;
use crate::AffinityError;
use crate::AffinityMask;
use crate::AffinityResult;
use crate::CpuId;
use crate::NativeAffinity;
use crate::ProcessHandle;
use crate::ThreadHandle;

/// Restricts `thread` to `cpu_ids` and returns the cpus it was allowed to run on before.
///
/// A cpu outside the process affinity is rejected by the OS and reported as
/// [`AffinityError::MutationFailed`], [`AffinityError::OutOfRange`] is only for ids
/// the host doesn't have.
pub fn set_thread_affinity<N: NativeAffinity>(
    native: &N,
    thread: &ThreadHandle<N>,
    cpu_ids: impl IntoIterator<Item = CpuId>,
) -> AffinityResult<Vec<CpuId>> {
    let mask = bitmask::encode(cpu_ids, native.processor_count())?;
    let previous = apply_thread_mask(native, thread, mask)?;

    Ok(bitmask::decode(previous))
}

pub fn set_current_thread_affinity<N: NativeAffinity>(
    native: &N,
    cpu_ids: impl IntoIterator<Item = CpuId>,
) -> AffinityResult<Vec<CpuId>> {
    set_thread_affinity(native, &ThreadHandle::current(native), cpu_ids)
}

/// Changes the set of cpus every thread of `process` may run on.
///
/// Threads whose own affinity falls outside the new set are clamped by the OS.
/// Concurrent thread affinity changes in the same process race with this call.
pub fn set_process_affinity<N: NativeAffinity>(
    native: &N,
    process: &ProcessHandle<'_, N>,
    cpu_ids: impl IntoIterator<Item = CpuId>,
) -> AffinityResult<()> {
    let mask = bitmask::encode(cpu_ids, native.processor_count())?;
    apply_process_mask(native, process, mask)
}

pub fn set_current_process_affinity<N: NativeAffinity>(
    native: &N,
    cpu_ids: impl IntoIterator<Item = CpuId>,
) -> AffinityResult<()> {
    set_process_affinity(native, &ProcessHandle::current(native), cpu_ids)
}

/// Lets `process` run on every cpu the system reports for it.
pub fn restrict_to_system_affinity<N: NativeAffinity>(
    native: &N,
    process: &ProcessHandle<'_, N>,
) -> AffinityResult<()> {
    let masks = query::process_masks(native, process)?;
    apply_process_mask(native, process, masks.system)
}

pub fn restrict_current_process_to_system_affinity<N: NativeAffinity>(
    native: &N,
) -> AffinityResult<()> {
    restrict_to_system_affinity(native, &ProcessHandle::current(native))
}

/// Restricts `process` to the first `count` cpus of the system affinity
/// and returns the applied set.
pub fn restrict_process_to<N: NativeAffinity>(
    native: &N,
    process: &ProcessHandle<'_, N>,
    count: usize,
) -> AffinityResult<Vec<CpuId>> {
    if count == 0 {
        return Err(AffinityError::EmptyRequest);
    }

    let system = bitmask::decode(query::process_masks(native, process)?.system);
    if count > system.len() {
        let missing = CpuId::new(system.len() as u32);
        return Err(AffinityError::out_of_range(missing, system.len()));
    }

    let cpu_ids = system.into_iter().take(count).collect::<Vec<_>>();
    set_process_affinity(native, process, cpu_ids.iter().copied())?;

    Ok(cpu_ids)
}

pub(crate) fn apply_thread_mask<N: NativeAffinity>(
    native: &N,
    thread: &ThreadHandle<N>,
    mask: AffinityMask,
) -> AffinityResult<AffinityMask> {
    let previous = native
        .set_thread_affinity(thread.raw(), mask)
        .map_err(AffinityError::mutation_failed)?;
    log::debug!("thread affinity changed from {previous:#x} to {mask:#x}");

    Ok(previous)
}

fn apply_process_mask<N: NativeAffinity>(
    native: &N,
    process: &ProcessHandle<'_, N>,
    mask: AffinityMask,
) -> AffinityResult<()> {
    native
        .set_process_affinity(process.raw(), mask)
        .map_err(AffinityError::mutation_failed)?;
    log::debug!("process {:?} affinity set to {mask:#x}", process.raw());

    Ok(())
}
