#![cfg(unix)]

use std::{fs, io, path::PathBuf, thread, time::Duration};

use shardrun::prelude::*;

/// A scratch directory unique to this test process and test name.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shardrun-{}-{}", std::process::id(), name));
    match fs::remove_dir_all(&dir) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            panic!("clear scratch dir {}: {err}", dir.display())
        }
        _ => {}
    }
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

#[test]
fn children_write_their_chunk_sums() {
    let dir = scratch("sums");
    let runner = Runner::new(WorkerConfig::new(3).unwrap())
        .with_units(ProcessUnits)
        .with_args(dir.clone());

    let items: Vec<u64> = (1..=10).collect();
    let report = runner
        .run_with_report(
            |chunk: Chunk<u64>, dir: PathBuf| {
                let sum: u64 = chunk.iter().sum();
                fs::write(dir.join(chunk.index().to_string()), sum.to_string())
                    .expect("write chunk output");
            },
            &items,
        )
        .unwrap();

    assert_eq!(report.spawned(), 3);
    assert!(report.is_success(), "{report:?}");

    let sums: Vec<u64> = (0..3)
        .map(|index| {
            fs::read_to_string(dir.join(index.to_string()))
                .expect("chunk output")
                .parse()
                .expect("chunk sum")
        })
        .collect();
    // [1, 2, 3, 4], [5, 6, 7], [8, 9, 10]
    assert_eq!(sums, [10, 18, 27]);

    fs::remove_dir_all(&dir).expect("remove scratch dir");
}

#[test]
fn child_exit_status_is_reported() {
    let runner = Runner::new(WorkerConfig::new(2).unwrap()).with_units(ProcessUnits);
    let report = runner
        .run_with_report(
            |chunk: Chunk<u8>, ()| {
                if chunk.index() == 1 {
                    std::process::exit(3);
                }
            },
            &[1, 2],
        )
        .unwrap();

    assert_eq!(
        report.statuses(),
        [
            UnitStatus::Completed,
            UnitStatus::Failed {
                reason: "exited with status 3".to_owned()
            }
        ]
    );
}

#[test]
fn hung_child_is_killed() {
    let config = WorkerConfig::new(1)
        .unwrap()
        .with_join_timeout(Duration::from_millis(100));
    let runner = Runner::new(config).with_units(ProcessUnits);

    let report = runner
        .run_with_report(
            |_: Chunk<u8>, ()| loop {
                thread::sleep(Duration::from_secs(1));
            },
            &[1],
        )
        .unwrap();

    assert_eq!(report.statuses(), [UnitStatus::Terminated]);
}

#[test]
fn process_unit_lifecycle() {
    let mut unit = ProcessUnits.create(0, || {});
    assert_eq!(unit.state(), UnitState::Created);

    unit.start().unwrap();
    assert!(unit.pid().is_some());
    assert_eq!(unit.state(), UnitState::Running);

    assert_eq!(unit.join(None).unwrap(), Some(UnitStatus::Completed));
    assert_eq!(unit.state(), UnitState::Completed);

    // Terminating a completed unit changes nothing.
    unit.terminate();
    assert_eq!(unit.status(), Some(UnitStatus::Completed));
}
