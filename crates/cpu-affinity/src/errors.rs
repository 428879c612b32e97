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

use thiserror::Error as ThisError;

use crate::CpuId;

/// Raw error code reported by the OS: errno on Linux, `GetLastError` on Windows.
pub type NativeErrorCode = i32;

#[derive(Debug, ThisError, PartialEq, Eq)]
#[non_exhaustive]
pub enum AffinityError {
    #[error("cpu id {cpu_id} is out of range, the host has {processor_count} logical processors")]
    OutOfRange {
        cpu_id: CpuId,
        processor_count: usize,
    },

    #[error("affinity request must name at least one cpu")]
    EmptyRequest,

    #[error("querying affinity failed: {}", describe(.code))]
    QueryFailed { code: NativeErrorCode },

    #[error("changing affinity failed: {}", describe(.code))]
    MutationFailed { code: NativeErrorCode },

    #[error("opening process {pid} failed: {}", describe(.code))]
    HandleOpenFailed { pid: u32, code: NativeErrorCode },

    #[error("failed to parse cpu list: {0}")]
    ParseError(String),
}

impl AffinityError {
    pub fn out_of_range(cpu_id: CpuId, processor_count: usize) -> Self {
        Self::OutOfRange {
            cpu_id,
            processor_count,
        }
    }

    pub fn query_failed(code: NativeErrorCode) -> Self {
        Self::QueryFailed { code }
    }

    pub fn mutation_failed(code: NativeErrorCode) -> Self {
        Self::MutationFailed { code }
    }

    pub fn handle_open_failed(pid: u32, code: NativeErrorCode) -> Self {
        Self::HandleOpenFailed { pid, code }
    }

    /// Returns the OS error code this error was built from, if any.
    pub fn native_code(&self) -> Option<NativeErrorCode> {
        match self {
            Self::QueryFailed { code }
            | Self::MutationFailed { code }
            | Self::HandleOpenFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

fn describe(code: &NativeErrorCode) -> String {
    std::io::Error::from_raw_os_error(*code).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_display() {
        let error = AffinityError::out_of_range(CpuId::new(9), 4);
        assert_eq!(
            error.to_string(),
            "cpu id 9 is out of range, the host has 4 logical processors"
        );
        assert_eq!(error.native_code(), None);
    }

    #[test]
    fn native_code_is_preserved() {
        assert_eq!(AffinityError::query_failed(3).native_code(), Some(3));
        assert_eq!(AffinityError::mutation_failed(22).native_code(), Some(22));
        assert_eq!(
            AffinityError::handle_open_failed(42, 5).native_code(),
            Some(5)
        );
        assert_eq!(AffinityError::EmptyRequest.native_code(), None);
    }

    #[test]
    fn native_code_is_rendered() {
        let message = AffinityError::mutation_failed(22).to_string();
        assert!(message.starts_with("changing affinity failed"), "{message}");
        assert!(message.ends_with("(os error 22)"), "{message}");
    }
}
