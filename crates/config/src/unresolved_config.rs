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

use eyre::WrapErr;
use serde::Deserialize;
use serde::Serialize;

use super::defaults::default_log_level;
use crate::*;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedAffinityConfig {
    #[serde(default)]
    pub logs: UnresolvedLogs,
    #[serde(default)]
    pub pinning: UnresolvedPinning,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedLogs {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for UnresolvedLogs {
    fn default() -> Self {
        UnresolvedLogs {
            log_level: default_log_level(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedPinning {
    /// Cpu list in the kernel `cpulist` format, e.g. "0-3,6".
    #[serde(default)]
    pub thread_cpus: String,
    pub process_cpu_limit: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl UnresolvedAffinityConfig {
    pub fn resolve(self) -> eyre::Result<AffinityConfig> {
        let logs = self.logs.resolve();
        let pinning = self.pinning.resolve()?;

        let config = AffinityConfig { logs, pinning };
        Ok(config)
    }
}

impl UnresolvedPinning {
    pub fn resolve(self) -> eyre::Result<Pinning> {
        let thread_cpus = cpu_affinity::parse_cpu_list(&self.thread_cpus)
            .wrap_err("pinning.thread-cpus should be a cpu list like \"0-3,6\"")?;

        if self.process_cpu_limit == Some(0) {
            eyre::bail!("pinning.process-cpu-limit should be positive");
        }

        let pinning = Pinning {
            thread_cpus,
            process_cpu_limit: self.process_cpu_limit,
        };
        Ok(pinning)
    }
}

impl LogLevel {
    pub fn to_tracing_filter(&self) -> tracing_subscriber::filter::LevelFilter {
        use tracing_subscriber::filter::LevelFilter;

        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl UnresolvedLogs {
    pub fn resolve(self) -> Logs {
        Logs {
            log_level: self.log_level.to_tracing_filter(),
        }
    }
}
