use std::cell::Cell;
use std::os::fd::{FromRawFd, OwnedFd};
use std::rc::Rc;

use reactls::{AsyncFile, ErrorKind, Handle, LoopState, Poller, PollerBuilder, TaskGroup, Transport};

fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");

    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn pipe_files(handle: &Handle) -> (AsyncFile, AsyncFile) {
    let (reader, writer) = pipe();
    (
        AsyncFile::new(reader, handle).expect("reader"),
        AsyncFile::new(writer, handle).expect("writer"),
    )
}

#[test]
fn block_on_returns_the_output() {
    let mut poller = PollerBuilder::new().event_capacity(8).build().expect("poller");
    let handle = poller.handle();

    let value = poller
        .block_on(async move {
            let task = handle.spawn(async { 20 + 1 });
            task.await.map(|value| value * 2)
        })
        .expect("block_on");

    assert_eq!(value, Some(42));
    assert_eq!(poller.state(), LoopState::Idle);
}

#[test]
fn reader_wakes_when_the_pipe_gets_data() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();
    let (mut reader, mut writer) = pipe_files(&handle);

    let received = poller
        .block_on(async move {
            let read_task = handle.spawn(async move {
                let mut buffer = [0u8; 8];
                let read = reader.read(&mut buffer).await.expect("read");
                buffer[..read].to_vec()
            });

            handle.spawn(async move {
                writer.write_all(b"ready").await.expect("write");
            });

            read_task.await
        })
        .expect("block_on");

    assert_eq!(received.as_deref(), Some(&b"ready"[..]));
}

#[test]
fn cancelling_a_task_releases_its_descriptor() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();
    let (mut reader, _writer) = pipe_files(&handle);

    let task = handle.spawn(async move {
        let mut buffer = [0u8; 1];
        let _ = reader.read(&mut buffer).await;
    });

    // One pass lets the task run up to its first suspension.
    poller.block_on(async {}).expect("block_on");
    assert_eq!(handle.registered_descriptors(), 1);
    assert!(!task.is_finished());

    task.abort();
    assert_eq!(handle.registered_descriptors(), 0);
    assert_eq!(handle.task_count(), 0);
    assert!(!handle.cancel(task.id()));

    assert_eq!(poller.block_on(task).expect("block_on"), None);
}

#[test]
fn stop_returns_from_run() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();
    let (mut reader, _writer) = pipe_files(&handle);
    let finished = Rc::new(Cell::new(false));

    handle.spawn(async move {
        let mut buffer = [0u8; 1];
        let _ = reader.read(&mut buffer).await;
    });

    let stopper = handle.clone();
    let flag = finished.clone();
    handle.spawn(async move {
        flag.set(true);
        stopper.stop();
    });

    poller.run().expect("run");

    assert!(finished.get());
    assert_eq!(poller.state(), LoopState::Idle);
    assert_eq!(handle.task_count(), 1);
}

#[test]
fn run_returns_once_every_task_finished() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();
    let count = Rc::new(Cell::new(0));

    for _ in 0..10 {
        let count = count.clone();
        handle.spawn(async move { count.set(count.get() + 1) });
    }

    poller.run().expect("run");
    assert_eq!(count.get(), 10);
    assert_eq!(handle.task_count(), 0);
}

#[test]
fn waiting_on_nothing_is_reported() {
    let mut poller = Poller::new().expect("poller");

    let err = poller
        .block_on(std::future::pending::<()>())
        .expect_err("stalled future");

    assert_eq!(err.kind(), ErrorKind::ProgrammingContract);
    assert_eq!(poller.state(), LoopState::Idle);
}

#[test]
fn dropping_a_group_cancels_its_members() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();
    let (mut reader, _writer) = pipe_files(&handle);

    let group = TaskGroup::new(&handle);
    group.spawn(async move {
        let mut buffer = [0u8; 1];
        let _ = reader.read(&mut buffer).await;
    });
    group.spawn(async {});

    poller.block_on(async {}).expect("block_on");
    assert_eq!(group.len(), 1);
    assert_eq!(handle.registered_descriptors(), 1);

    drop(group);
    assert_eq!(handle.task_count(), 0);
    assert_eq!(handle.registered_descriptors(), 0);
}
