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


use crate::bitmask;
use crate::mutate;
use crate::AffinityError;
use crate::AffinityMask;
use crate::AffinityResult;
use crate::CpuId;
use crate::NativeAffinity;
use crate::ThreadHandle;

/// Marks a guard with nothing left to restore. A thread always has at least
/// one cpu, so no real mask is ever zero.
const RELEASED: AffinityMask = 0;

/// Temporarily restricts the calling thread to a set of cpus.
///
/// [`ScopedAffinity::begin`] captures the thread's affinity and applies the requested
/// one in a single native call. The captured affinity is put back by
/// [`ScopedAffinity::release`] or, if that never happened, when the guard is dropped,
/// so early returns and panics restore it too.
///
/// The guard is bound to the thread that created it: it is neither `Send` nor `Sync`.
#[derive(Debug)]
pub struct ScopedAffinity<'native, N: NativeAffinity> {
    native: &'native N,
    thread: ThreadHandle<N>,
    previous: AffinityMask,
}

impl<'native, N: NativeAffinity> ScopedAffinity<'native, N> {
    pub fn begin(
        native: &'native N,
        cpu_ids: impl IntoIterator<Item = CpuId>,
    ) -> AffinityResult<Self> {
        let cpu_ids = cpu_ids.into_iter().collect::<Vec<_>>();
        if cpu_ids.is_empty() {
            return Err(AffinityError::EmptyRequest);
        }

        let mask = bitmask::encode(cpu_ids, native.processor_count())?;
        let thread = ThreadHandle::current(native);
        let previous = mutate::apply_thread_mask(native, &thread, mask)?;

        Ok(Self {
            native,
            thread,
            previous,
        })
    }

    pub fn is_armed(&self) -> bool {
        self.previous != RELEASED
    }

    /// Cpus that will be restored on release, empty once released.
    pub fn previous_affinity(&self) -> Vec<CpuId> {
        bitmask::decode(self.previous)
    }

    /// Restores the captured affinity.
    ///
    /// Only the first successful call touches the OS, later calls are no-ops.
    /// If the restore fails the guard stays armed and the drop will try once more.
    pub fn release(&mut self) -> AffinityResult<()> {
        if !self.is_armed() {
            return Ok(());
        }

        mutate::apply_thread_mask(self.native, &self.thread, self.previous)?;
        self.previous = RELEASED;

        Ok(())
    }
}

impl<N: NativeAffinity> Drop for ScopedAffinity<'_, N> {
    fn drop(&mut self) {
        let previous = self.previous;
        if let Err(error) = self.release() {
            log::error!("restoring thread affinity {previous:#x} failed: {error}");
        }
    }
}

/// Runs `work` with the calling thread restricted to `cpu_ids`.
///
/// The previous affinity is restored whichever way `work` exits. A failed restore
/// after `work` returned is reported instead of its result.
pub fn with_affinity<N: NativeAffinity, T>(
    native: &N,
    cpu_ids: impl IntoIterator<Item = CpuId>,
    work: impl FnOnce() -> T,
) -> AffinityResult<T> {
    let mut guard = ScopedAffinity::begin(native, cpu_ids)?;
    let result = work();
    guard.release()?;

    Ok(result)
}
