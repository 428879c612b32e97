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

//! Query and mutation behaviour against the simulated host.

use maplit::btreeset;
use test_log::test;

use cpu_affinity::simulated::SimulatedAffinity;
use cpu_affinity::simulated::INVALID_PARAMETER;
use cpu_affinity::simulated::SIMULATED_PID;
use cpu_affinity::*;

fn cpus(raw: &[u32]) -> Vec<CpuId> {
    raw.iter().copied().map(CpuId::new).collect()
}

#[test]
fn previous_affinity_is_reported_in_order() {
    let native = SimulatedAffinity::new(4);

    let before_a = set_current_thread_affinity(&native, cpus(&[1, 2])).unwrap();
    assert_eq!(before_a, cpus(&[0, 1, 2, 3]));

    let before_b = set_current_thread_affinity(&native, cpus(&[3])).unwrap();
    assert_eq!(before_b, cpus(&[1, 2]));

    assert_eq!(current_processor_id(&native).unwrap(), CpuId::new(3));
}

#[test]
fn thread_affinity_deduplicates_request() {
    let native = SimulatedAffinity::new(4);
    let requested = btreeset! { CpuId::new(2), CpuId::new(0) };

    set_current_thread_affinity(&native, requested.iter().copied().chain([CpuId::new(2)]))
        .unwrap();
    assert_eq!(current_thread_affinity(&native).unwrap(), cpus(&[0, 2]));
}

#[test]
fn out_of_range_thread_request_changes_nothing() {
    let native = SimulatedAffinity::new(4);

    let result = set_current_thread_affinity(&native, cpus(&[1, 7]));
    assert_eq!(
        result,
        Err(AffinityError::OutOfRange {
            cpu_id: CpuId::new(7),
            processor_count: 4
        })
    );
    assert_eq!(native.affinity_calls(), 0);
    assert_eq!(native.current_thread_mask(), 0b1111);
}

#[test]
fn narrowed_process_rejects_thread_outside_it() {
    let native = SimulatedAffinity::new(4);
    assert_eq!(current_process_affinity(&native).unwrap(), cpus(&[0, 1, 2, 3]));
    assert_eq!(current_system_affinity(&native).unwrap(), cpus(&[0, 1, 2, 3]));

    set_current_process_affinity(&native, cpus(&[0, 1])).unwrap();

    let result = set_current_thread_affinity(&native, cpus(&[2]));
    assert_eq!(
        result,
        Err(AffinityError::MutationFailed {
            code: INVALID_PARAMETER
        })
    );
    assert_eq!(current_process_affinity(&native).unwrap(), cpus(&[0, 1]));
    assert_eq!(current_system_affinity(&native).unwrap(), cpus(&[0, 1, 2, 3]));
}

#[test]
fn current_thread_affinity_leaves_thread_unchanged() {
    let native = SimulatedAffinity::new(8);
    set_current_thread_affinity(&native, cpus(&[1, 5])).unwrap();

    assert_eq!(current_thread_affinity(&native).unwrap(), cpus(&[1, 5]));
    assert_eq!(native.current_thread_mask(), 0b0010_0010);
}

#[test]
fn restricting_to_system_affinity_widens_process() {
    let native = SimulatedAffinity::new(4);
    set_current_process_affinity(&native, cpus(&[3])).unwrap();

    restrict_current_process_to_system_affinity(&native).unwrap();
    assert_eq!(native.process_mask(SIMULATED_PID), Some(0b1111));
}

#[test]
fn restrict_process_to_first_cpus() {
    let native = SimulatedAffinity::new(8);
    let process = ProcessHandle::current(&native);

    let applied = restrict_process_to(&native, &process, 3).unwrap();
    assert_eq!(applied, cpus(&[0, 1, 2]));
    assert_eq!(process_affinity(&native, &process).unwrap(), applied);

    assert_eq!(
        restrict_process_to(&native, &process, 0),
        Err(AffinityError::EmptyRequest)
    );
    assert_eq!(
        restrict_process_to(&native, &process, 9),
        Err(AffinityError::OutOfRange {
            cpu_id: CpuId::new(8),
            processor_count: 8
        })
    );
    assert_eq!(process_affinity(&native, &process).unwrap(), applied);
}

#[test]
fn opened_process_is_closed_once() {
    let native = SimulatedAffinity::new(4).with_process(42, 0b0110);
    {
        let process = ProcessHandle::open(&native, 42).unwrap();
        assert_eq!(process.pid(), Some(42));
        assert_eq!(native.open_handles(), 1);

        assert_eq!(process_affinity(&native, &process).unwrap(), cpus(&[1, 2]));
        set_process_affinity(&native, &process, cpus(&[0, 3])).unwrap();
        restrict_to_system_affinity(&native, &process).unwrap();
    }

    assert_eq!(native.open_handles(), 0);
    assert_eq!(native.process_mask(42), Some(0b1111));
}

#[test]
fn owned_handle_is_closed_on_failure_path() {
    fn narrow(native: &SimulatedAffinity, pid: u32) -> AffinityResult<()> {
        let process = ProcessHandle::open(native, pid)?;
        set_process_affinity(native, &process, cpus(&[9]))
    }

    let native = SimulatedAffinity::new(4).with_process(42, 0b0001);
    assert!(matches!(
        narrow(&native, 42),
        Err(AffinityError::OutOfRange { .. })
    ));
    assert_eq!(native.open_handles(), 0);
    assert_eq!(native.process_mask(42), Some(0b0001));
}

#[test]
fn opening_missing_process_fails() {
    let native = SimulatedAffinity::new(4);

    let result = ProcessHandle::open(&native, 4242);
    assert!(matches!(
        result,
        Err(AffinityError::HandleOpenFailed {
            pid: 4242,
            code: INVALID_PARAMETER
        })
    ));
    assert_eq!(native.open_handles(), 0);
}

#[test]
fn current_process_handle_is_never_closed() {
    let native = SimulatedAffinity::new(4).with_process(42, 0b0001);
    let _other = ProcessHandle::open(&native, 42).unwrap();
    {
        let process = ProcessHandle::current(&native);
        assert_eq!(process.pid(), None);
        process_affinity(&native, &process).unwrap();
    }

    assert_eq!(native.open_handles(), 1);
}

#[test]
fn cpu_list_feeds_affinity_calls() {
    let native = SimulatedAffinity::new(8);

    let requested = parse_cpu_list("4-6,1").unwrap();
    let _guard = ScopedAffinity::begin(&native, requested.iter().copied()).unwrap();

    assert_eq!(
        format_cpu_list(&current_thread_affinity(&native).unwrap()),
        "1,4-6"
    );
}
