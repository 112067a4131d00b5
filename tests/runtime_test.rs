mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use beadboard::dashboard::{Dashboard, Mode};
use beadboard::msg::{Key, Msg, WorkerEvent};
use beadboard::ports::EventSender;
use beadboard::runner::{MockPipelineRun, MockPipelineRunner};
use beadboard::runtime::{Runtime, EVENT_CHANNEL_CAPACITY};
use beadboard::types::{PhaseStatus, PipelineOutput};

use common::{make_bead, make_detail, options_with_store, phase_running, phase_terminal};

/// Snapshot of the model taken after every processed message.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Frame {
    mode: Mode,
    status: String,
    worker_running: bool,
}

fn frame(dashboard: &Dashboard) -> Frame {
    Frame {
        mode: dashboard.mode,
        status: dashboard.status_msg.clone(),
        worker_running: dashboard.worker_running,
    }
}

async fn send_key(tx: &tokio::sync::mpsc::UnboundedSender<Msg>, key: Key) {
    // Let previously queued work (spawned commands) land first.
    tokio::time::sleep(Duration::from_millis(60)).await;
    tx.send(Msg::Key(key)).expect("loop alive");
}

#[tokio::test]
async fn full_pipeline_dispatch_reaches_summary_and_quits() {
    let (options, _resolver) = options_with_store(
        vec![make_bead("cap-001")],
        vec![make_detail("cap-001")],
    );
    let runner = MockPipelineRunner::new(vec![MockPipelineRun {
        updates: vec![
            phase_running("plan"),
            phase_terminal("plan", PhaseStatus::Passed, "planned"),
            phase_running("code"),
            phase_terminal("code", PhaseStatus::Passed, "coded"),
        ],
        result: Ok(PipelineOutput {
            bead_id: "cap-001".to_string(),
            success: true,
            ..Default::default()
        }),
    }]);
    let options = options.with_pipeline_runner(Arc::new(runner));

    let dashboard = Dashboard::new(&options);
    let runtime = Runtime::new(options);
    let tx = runtime.sender();

    let frames: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = frames.clone();
    let loop_task = tokio::spawn(runtime.run(dashboard, move |dashboard| {
        if let Ok(mut frames) = sink.lock() {
            frames.push(frame(dashboard));
        }
        Ok(())
    }));

    // Wait for the initial bead list, then dispatch and wait for Summary.
    send_key(&tx, Key::Enter).await; // confirm screen
    send_key(&tx, Key::Enter).await; // dispatch

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if frames.lock().unwrap().iter().any(|f| f.mode == Mode::Summary) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "never reached Summary");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Return to browse, then quit.
    send_key(&tx, Key::Enter).await;
    send_key(&tx, Key::Char('q')).await;
    tokio::time::timeout(Duration::from_secs(5), loop_task)
        .await
        .expect("loop must quit")
        .expect("loop task must not panic")
        .expect("loop must exit cleanly");

    let frames = frames.lock().unwrap();
    // Exactly one dispatch means exactly one transition into Summary.
    let into_summary = frames
        .windows(2)
        .filter(|w| w[0].mode != Mode::Summary && w[1].mode == Mode::Summary)
        .count();
    assert_eq!(into_summary, 1);

    // The worker stopped before Summary was entered (terminal then close).
    let summary_frame = frames.iter().find(|f| f.mode == Mode::Summary).unwrap();
    assert!(!summary_frame.worker_running);
}

#[tokio::test]
async fn background_completion_updates_status_without_leaving_browse() {
    let (options, _resolver) = options_with_store(
        vec![make_bead("cap-001")],
        vec![make_detail("cap-001")],
    );
    // The runner parks until cancelled so Esc lands while it runs, then
    // finishes successfully.
    struct SlowRunner;
    #[async_trait::async_trait]
    impl beadboard::ports::PipelineRunner for SlowRunner {
        async fn run(
            &self,
            input: beadboard::types::PipelineInput,
            events: EventSender,
        ) -> Result<PipelineOutput, beadboard::error::DashError> {
            events
                .send(WorkerEvent::PhaseUpdate(phase_running("plan")))
                .await;
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok(PipelineOutput {
                bead_id: input.bead_id,
                success: true,
                ..Default::default()
            })
        }
    }
    let options = options.with_pipeline_runner(Arc::new(SlowRunner));

    let dashboard = Dashboard::new(&options);
    let runtime = Runtime::new(options);
    let tx = runtime.sender();

    let frames: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = frames.clone();
    let loop_task = tokio::spawn(runtime.run(dashboard, move |dashboard| {
        if let Ok(mut frames) = sink.lock() {
            frames.push(frame(dashboard));
        }
        Ok(())
    }));

    send_key(&tx, Key::Enter).await; // confirm
    send_key(&tx, Key::Enter).await; // dispatch
    send_key(&tx, Key::Esc).await; // background

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if frames
            .lock()
            .unwrap()
            .iter()
            .any(|f| f.status.contains("✓ Pipeline complete"))
        {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "background completion never reported"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    {
        let frames = frames.lock().unwrap();
        // Mode never left Browse after the hand-off status appeared.
        let handoff = frames
            .iter()
            .position(|f| f.status.contains("in background"))
            .expect("hand-off status seen");
        assert!(frames[handoff..].iter().all(|f| f.mode == Mode::Browse));
    }

    send_key(&tx, Key::Char('q')).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), loop_task)
        .await
        .expect("loop must quit");
}

#[tokio::test]
async fn worker_contract_terminal_precedes_close() {
    // Exercise the EventSender/worker-channel contract directly: status
    // pushes race cancellation, the terminal is delivered, then the channel
    // closes exactly once.
    let (tx, mut rx) = tokio::sync::mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = tokio_util::sync::CancellationToken::new();
    let events = EventSender::new(tx, cancel.clone());

    let worker = tokio::spawn(async move {
        events
            .send(WorkerEvent::PhaseUpdate(phase_running("plan")))
            .await;
        events.cancel_token().cancelled().await;
        // Status pushes after cancellation are dropped.
        assert!(
            !events
                .send(WorkerEvent::PhaseUpdate(phase_running("code")))
                .await
        );
        // The terminal still goes through.
        assert!(
            events
                .send_final(WorkerEvent::PipelineError("cancelled".to_string()))
                .await
        );
    });

    assert!(matches!(
        rx.recv().await,
        Some(WorkerEvent::PhaseUpdate(_))
    ));
    // Cancel mid-run; the worker must still deliver a terminal message.
    cancel.cancel();
    worker.await.expect("worker run");
    assert!(matches!(rx.recv().await, Some(WorkerEvent::PipelineError(_))));
    assert!(rx.recv().await.is_none(), "channel closes after terminal");
}
