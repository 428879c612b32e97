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

use std::marker::PhantomData;

use crate::AffinityError;
use crate::AffinityResult;
use crate::NativeAffinity;

/// Pseudo handle of the calling thread.
///
/// It is never closed and it is neither `Send` nor `Sync`: the raw value only
/// means "the calling thread" on the thread that obtained it.
#[derive(Debug)]
pub struct ThreadHandle<N: NativeAffinity> {
    raw: N::Thread,
    _not_send: PhantomData<*const ()>,
}

impl<N: NativeAffinity> ThreadHandle<N> {
    pub fn current(native: &N) -> Self {
        Self {
            raw: native.current_thread(),
            _not_send: PhantomData,
        }
    }

    pub fn raw(&self) -> N::Thread {
        self.raw
    }
}

/// A process to query or change affinity of.
#[derive(Debug)]
pub enum ProcessHandle<'native, N: NativeAffinity> {
    /// The calling process, borrowed from the OS and never closed.
    Current(N::Process),
    /// A process opened by id, closed when dropped.
    Owned(OwnedProcess<'native, N>),
}

impl<'native, N: NativeAffinity> ProcessHandle<'native, N> {
    pub fn current(native: &N) -> Self {
        Self::Current(native.current_process())
    }

    /// Opens a handle to the process with the given id.
    pub fn open(native: &'native N, pid: u32) -> AffinityResult<Self> {
        let raw = native
            .open_process(pid)
            .map_err(|code| AffinityError::handle_open_failed(pid, code))?;
        log::debug!("opened process {pid}");

        Ok(Self::Owned(OwnedProcess { native, raw, pid }))
    }

    pub fn raw(&self) -> N::Process {
        match self {
            Self::Current(raw) => *raw,
            Self::Owned(owned) => owned.raw,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Current(_) => None,
            Self::Owned(owned) => Some(owned.pid),
        }
    }
}

/// Exclusively owned process handle, closed exactly once on drop.
#[derive(Debug)]
pub struct OwnedProcess<'native, N: NativeAffinity> {
    native: &'native N,
    raw: N::Process,
    pid: u32,
}

impl<N: NativeAffinity> Drop for OwnedProcess<'_, N> {
    fn drop(&mut self) {
        if self.native.close_process(self.raw) {
            log::debug!("closed process {}", self.pid);
        } else {
            log::warn!("closing handle of process {} failed", self.pid);
        }
    }
}
