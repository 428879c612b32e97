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

//! An in-memory affinity model with the rules Windows applies: a thread mask must be
//! a subset of its process mask, a process mask must be a subset of the system mask,
//! and narrowing a process clamps its threads.
//!
//! Every OS thread that touches a [`SimulatedAffinity`] gets its own simulated thread
//! in the simulated current process, so guards and per-thread state behave like
//! they do on a real host.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::bitmask;
use crate::AffinityMask;
use crate::NativeAffinity;
use crate::NativeErrorCode;
use crate::ProcessMasks;

/// Id of the simulated calling process.
pub const SIMULATED_PID: u32 = 1;

/// `ERROR_INVALID_HANDLE`
pub const INVALID_HANDLE: NativeErrorCode = 6;
/// `ERROR_INVALID_PARAMETER`
pub const INVALID_PARAMETER: NativeErrorCode = 87;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SimulatedThread {
    pid: u32,
    tid: u64,
}

#[derive(Debug)]
pub struct SimulatedAffinity {
    processor_count: usize,
    state: Mutex<SimulatedState>,
}

#[derive(Debug)]
struct SimulatedState {
    /// The calling process, always present.
    current: SimulatedProcess,
    others: HashMap<u32, SimulatedProcess>,
    affinity_calls: usize,
    open_handles: usize,
    failing_thread_updates: Option<NativeErrorCode>,
}

#[derive(Debug)]
struct SimulatedProcess {
    mask: AffinityMask,
    threads: HashMap<u64, AffinityMask>,
}

impl SimulatedProcess {
    fn new(mask: AffinityMask) -> Self {
        Self {
            mask,
            threads: HashMap::new(),
        }
    }

    fn thread_mask(&mut self, tid: u64) -> &mut AffinityMask {
        self.threads.entry(tid).or_insert(self.mask)
    }
}

impl SimulatedState {
    fn process(&self, pid: u32) -> Option<&SimulatedProcess> {
        match pid {
            SIMULATED_PID => Some(&self.current),
            pid => self.others.get(&pid),
        }
    }

    fn process_mut(&mut self, pid: u32) -> Option<&mut SimulatedProcess> {
        match pid {
            SIMULATED_PID => Some(&mut self.current),
            pid => self.others.get_mut(&pid),
        }
    }
}

impl SimulatedAffinity {
    /// A host with `processor_count` cpus whose current process may use all of them.
    pub fn new(processor_count: usize) -> Self {
        let processor_count = processor_count.clamp(1, bitmask::MASK_BITS);

        let state = SimulatedState {
            current: SimulatedProcess::new(bitmask::system_mask(processor_count)),
            others: HashMap::new(),
            affinity_calls: 0,
            open_handles: 0,
            failing_thread_updates: None,
        };

        Self {
            processor_count,
            state: Mutex::new(state),
        }
    }

    /// Adds another process that can be opened by `pid`, or replaces the current one
    /// when `pid` is [`SIMULATED_PID`].
    ///
    /// The mask is clamped to the system mask, a mask with no system cpu left falls
    /// back to the whole system.
    pub fn with_process(self, pid: u32, mask: AffinityMask) -> Self {
        let mask = match mask & self.system_mask() {
            0 => self.system_mask(),
            mask => mask,
        };

        let process = SimulatedProcess::new(mask);
        let mut state = self.state.lock();
        match pid {
            SIMULATED_PID => state.current = process,
            pid => {
                state.others.insert(pid, process);
            }
        }
        drop(state);

        self
    }

    pub fn system_mask(&self) -> AffinityMask {
        bitmask::system_mask(self.processor_count)
    }

    pub fn process_mask(&self, pid: u32) -> Option<AffinityMask> {
        self.state.lock().process(pid).map(|process| process.mask)
    }

    /// Mask of the calling thread in the simulated current process.
    pub fn current_thread_mask(&self) -> AffinityMask {
        let tid = current_tid();
        let mut state = self.state.lock();
        *state.current.thread_mask(tid)
    }

    /// Number of native get/set affinity calls made so far.
    pub fn affinity_calls(&self) -> usize {
        self.state.lock().affinity_calls
    }

    /// Number of process handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles
    }

    /// Makes every following thread affinity change fail with `code`, `None` heals it.
    pub fn fail_thread_updates(&self, code: Option<NativeErrorCode>) {
        self.state.lock().failing_thread_updates = code;
    }
}

impl NativeAffinity for SimulatedAffinity {
    type Thread = SimulatedThread;
    type Process = u32;

    fn processor_count(&self) -> usize {
        self.processor_count
    }

    fn current_processor(&self) -> Result<usize, NativeErrorCode> {
        // the simulated scheduler runs a thread on its lowest allowed cpu
        Ok(self.current_thread_mask().trailing_zeros() as usize)
    }

    fn current_thread(&self) -> Self::Thread {
        SimulatedThread {
            pid: SIMULATED_PID,
            tid: current_tid(),
        }
    }

    fn current_process(&self) -> Self::Process {
        SIMULATED_PID
    }

    fn set_thread_affinity(
        &self,
        thread: Self::Thread,
        mask: AffinityMask,
    ) -> Result<AffinityMask, NativeErrorCode> {
        let mut state = self.state.lock();
        state.affinity_calls += 1;

        if let Some(code) = state.failing_thread_updates {
            return Err(code);
        }

        let process = state.process_mut(thread.pid).ok_or(INVALID_HANDLE)?;
        if mask == 0 || mask & !process.mask != 0 {
            return Err(INVALID_PARAMETER);
        }

        let thread_mask = process.thread_mask(thread.tid);
        Ok(std::mem::replace(thread_mask, mask))
    }

    fn get_process_affinity(
        &self,
        process: Self::Process,
    ) -> Result<ProcessMasks, NativeErrorCode> {
        let mut state = self.state.lock();
        state.affinity_calls += 1;

        let process = state.process(process).ok_or(INVALID_HANDLE)?;
        Ok(ProcessMasks {
            process: process.mask,
            system: self.system_mask(),
        })
    }

    fn set_process_affinity(
        &self,
        process: Self::Process,
        mask: AffinityMask,
    ) -> Result<(), NativeErrorCode> {
        let system_mask = self.system_mask();
        let mut state = self.state.lock();
        state.affinity_calls += 1;

        let process = state.process_mut(process).ok_or(INVALID_HANDLE)?;
        if mask == 0 || mask & !system_mask != 0 {
            return Err(INVALID_PARAMETER);
        }

        process.mask = mask;
        for thread_mask in process.threads.values_mut() {
            let clamped = *thread_mask & mask;
            *thread_mask = if clamped == 0 { mask } else { clamped };
        }

        Ok(())
    }

    fn open_process(&self, pid: u32) -> Result<Self::Process, NativeErrorCode> {
        let mut state = self.state.lock();
        if state.process(pid).is_none() {
            return Err(INVALID_PARAMETER);
        }

        state.open_handles += 1;
        Ok(pid)
    }

    fn close_process(&self, _process: Self::Process) -> bool {
        let mut state = self.state.lock();
        match state.open_handles.checked_sub(1) {
            Some(open_handles) => {
                state.open_handles = open_handles;
                true
            }
            None => false,
        }
    }
}

fn current_tid() -> u64 {
    THREAD_ID.with(|tid| *tid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_starts_with_process_mask() {
        let native = SimulatedAffinity::new(4);
        assert_eq!(native.current_thread_mask(), 0b1111);
        assert_eq!(native.current_processor(), Ok(0));
    }

    #[test]
    fn thread_mask_must_fit_process_mask() {
        let native = SimulatedAffinity::new(4);
        native.set_process_affinity(SIMULATED_PID, 0b0011).unwrap();

        let thread = native.current_thread();
        assert_eq!(
            native.set_thread_affinity(thread, 0b0100),
            Err(INVALID_PARAMETER)
        );
        assert_eq!(native.set_thread_affinity(thread, 0b0010), Ok(0b0011));
        assert_eq!(native.current_processor(), Ok(1));
    }

    #[test]
    fn narrowing_process_clamps_threads() {
        let native = SimulatedAffinity::new(4);
        let thread = native.current_thread();
        native.set_thread_affinity(thread, 0b1000).unwrap();

        native.set_process_affinity(SIMULATED_PID, 0b0110).unwrap();
        assert_eq!(native.current_thread_mask(), 0b0110);

        native.set_thread_affinity(thread, 0b0100).unwrap();
        native.set_process_affinity(SIMULATED_PID, 0b0101).unwrap();
        assert_eq!(native.current_thread_mask(), 0b0100);
    }

    #[test]
    fn threads_are_tracked_separately() {
        let native = SimulatedAffinity::new(4);
        native
            .set_thread_affinity(native.current_thread(), 0b0001)
            .unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| assert_eq!(native.current_thread_mask(), 0b1111));
        });
        assert_eq!(native.current_thread_mask(), 0b0001);
    }

    #[test]
    fn process_masks_are_never_empty() {
        let native = SimulatedAffinity::new(4)
            .with_process(SIMULATED_PID, 0b0110)
            .with_process(42, 0b1_0000);

        assert_eq!(native.process_mask(SIMULATED_PID), Some(0b0110));
        assert_eq!(native.current_thread_mask(), 0b0110);
        assert_eq!(native.process_mask(42), Some(0b1111));
        assert_eq!(native.process_mask(7), None);

        assert_eq!(
            native.set_process_affinity(SIMULATED_PID, 0),
            Err(INVALID_PARAMETER)
        );
        assert_eq!(native.process_mask(SIMULATED_PID), Some(0b0110));
    }

    #[test]
    fn handles_are_counted() {
        let native = SimulatedAffinity::new(2).with_process(42, 0b01);
        assert_eq!(native.open_process(7), Err(INVALID_PARAMETER));

        let process = native.open_process(42).unwrap();
        assert_eq!(native.open_handles(), 1);
        assert!(native.close_process(process));
        assert!(!native.close_process(process));
        assert_eq!(native.open_handles(), 0);
    }
}
