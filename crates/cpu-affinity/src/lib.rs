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

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![deny(
    dead_code,
    nonstandard_style,
    unused_imports,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

//! Thread and process cpu affinity on hosts that describe it with one bit per
//! logical cpu in a machine word.
//!
//! All operations take the affinity backend explicitly: [`OsAffinity`] for the
//! running host, [`simulated::SimulatedAffinity`] for deterministic tests.
//!
//! ```ignore
//! use cpu_affinity::*;
//!
//! let os = OsAffinity;
//! let _pinned = ScopedAffinity::begin(&os, [CpuId::new(0)])?;
//! // work here runs on cpu 0, the previous affinity comes back on scope exit
//! ```

pub mod bitmask;
mod cpu_id;
mod cpu_list;
mod errors;
mod handle;
mod mutate;
mod native;
mod query;
mod scoped;
pub mod simulated;

pub use cpu_id::AffinityMask;
pub use cpu_id::CpuId;
pub use cpu_id::CpuIdType;
pub use cpu_list::format_cpu_list;
pub use cpu_list::parse_cpu_list;
pub use errors::AffinityError;
pub use errors::NativeErrorCode;
pub use handle::OwnedProcess;
pub use handle::ProcessHandle;
pub use handle::ThreadHandle;
pub use mutate::restrict_current_process_to_system_affinity;
pub use mutate::restrict_process_to;
pub use mutate::restrict_to_system_affinity;
pub use mutate::set_current_process_affinity;
pub use mutate::set_current_thread_affinity;
pub use mutate::set_process_affinity;
pub use mutate::set_thread_affinity;
pub use native::NativeAffinity;
pub use native::OsAffinity;
pub use native::ProcessMasks;
pub use query::current_process_affinity;
pub use query::current_processor_id;
pub use query::current_system_affinity;
pub use query::current_thread_affinity;
pub use query::process_affinity;
pub use query::processor_count;
pub use query::system_affinity;
pub use scoped::with_affinity;
pub use scoped::ScopedAffinity;

pub type AffinityResult<T> = Result<T, AffinityError>;
