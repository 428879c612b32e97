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

//! Read-only affinity accessors.

use crate::bitmask;
use crate::mutate;
use crate::AffinityError;
use crate::AffinityResult;
use crate::CpuId;
use crate::NativeAffinity;
use crate::ProcessHandle;
use crate::ProcessMasks;
use crate::ThreadHandle;

pub fn processor_count<N: NativeAffinity>(native: &N) -> usize {
    native.processor_count()
}

/// Returns the logical processor the calling thread is executing on.
///
/// The answer is only true at the moment of the call: unless the thread is pinned
/// to a single cpu, the scheduler is free to migrate it right after this returns.
pub fn current_processor_id<N: NativeAffinity>(native: &N) -> AffinityResult<CpuId> {
    let cpu = native
        .current_processor()
        .map_err(AffinityError::query_failed)?;

    Ok(CpuId::new(cpu as u32))
}

pub fn process_affinity<N: NativeAffinity>(
    native: &N,
    process: &ProcessHandle<'_, N>,
) -> AffinityResult<Vec<CpuId>> {
    let masks = process_masks(native, process)?;
    Ok(bitmask::decode(masks.process))
}

/// Returns the cpus the system lets processes run on, as reported alongside
/// the affinity of `process`.
pub fn system_affinity<N: NativeAffinity>(
    native: &N,
    process: &ProcessHandle<'_, N>,
) -> AffinityResult<Vec<CpuId>> {
    let masks = process_masks(native, process)?;
    Ok(bitmask::decode(masks.system))
}

pub fn current_process_affinity<N: NativeAffinity>(native: &N) -> AffinityResult<Vec<CpuId>> {
    process_affinity(native, &ProcessHandle::current(native))
}

pub fn current_system_affinity<N: NativeAffinity>(native: &N) -> AffinityResult<Vec<CpuId>> {
    system_affinity(native, &ProcessHandle::current(native))
}

/// Returns the affinity of the calling thread.
///
/// There is no native getter for a thread mask, so the thread is briefly moved
/// to its process mask, which reports the previous value, and then put back.
pub fn current_thread_affinity<N: NativeAffinity>(native: &N) -> AffinityResult<Vec<CpuId>> {
    let masks = process_masks(native, &ProcessHandle::current(native))?;
    let thread = ThreadHandle::current(native);

    let previous = mutate::apply_thread_mask(native, &thread, masks.process)?;
    mutate::apply_thread_mask(native, &thread, previous)?;

    Ok(bitmask::decode(previous))
}

pub(crate) fn process_masks<N: NativeAffinity>(
    native: &N,
    process: &ProcessHandle<'_, N>,
) -> AffinityResult<ProcessMasks> {
    native
        .get_process_affinity(process.raw())
        .map_err(AffinityError::query_failed)
}
