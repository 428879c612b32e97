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

use cpu_affinity::CpuId;

use crate::defaults::default_log_level;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AffinityConfig {
    pub logs: Logs,
    pub pinning: Pinning,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Logs {
    pub log_level: tracing_subscriber::filter::LevelFilter,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pinning {
    /// Cpus the demo pins its worker thread to, all process cpus if empty.
    pub thread_cpus: Vec<CpuId>,
    /// Upper bound on the cpus the process keeps when restricting it.
    pub process_cpu_limit: Option<usize>,
}

impl Default for Logs {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_tracing_filter(),
        }
    }
}
