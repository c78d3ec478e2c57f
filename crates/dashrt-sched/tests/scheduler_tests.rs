//! End-to-end scheduler scenarios: dependency chains, priority ordering,
//! overlay preloading, hardware fallback, and completion delivery under
//! contention.

use std::sync::Arc;
use std::time::Duration;

use dashrt_core::{
    AppDescriptor, AppRegistry, BackendMode, FftContext, FftPlan, ResourceKind, SchedulerConfig,
    Task, TaskParams,
};
use dashrt_hw::{MockBitstreamLoader, MockDmaEngine};
use dashrt_sched::{
    Accelerator, CpuWorker, FpgaSlot, FpgaSlotOptions, ReportFormat, ReportSink, Scheduler,
    SharedLineBuffer,
};

fn cpu_app(name: &str) -> AppDescriptor {
    AppDescriptor {
        app: name.to_owned(),
        bitstream_path: String::new(),
        kernel_name: format!("{name}_kernel"),
        kind: ResourceKind::Cpu,
    }
}

fn overlay_app(name: &str, kind: ResourceKind) -> AppDescriptor {
    AppDescriptor {
        app: name.to_owned(),
        bitstream_path: format!("bitstreams/{name}_partial.bin"),
        kernel_name: format!("{name}_kernel"),
        kind,
    }
}

fn capture_scheduler(
    registry: Arc<AppRegistry>,
    config: SchedulerConfig,
) -> (Arc<Scheduler>, SharedLineBuffer) {
    // Scheduler logs show up under RUST_LOG when a test needs them.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let buffer = SharedLineBuffer::new();
    let sink = ReportSink::to_writer(ReportFormat::Csv, Box::new(buffer.clone()));
    (
        Arc::new(Scheduler::with_report_sink(registry, config, sink)),
        buffer,
    )
}

/// Ids in report order from the CSV capture.
fn reported_ids(buffer: &SharedLineBuffer) -> Vec<u64> {
    buffer
        .lines()
        .iter()
        .map(|line| line.split(',').next().unwrap().parse().unwrap())
        .collect()
}

#[tokio::test]
async fn linear_chain_runs_in_dependency_order() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(cpu_app("a"));
    registry.register_app(cpu_app("b"));
    let (sched, buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Cpu,
            cpu_workers: 1,
            ..Default::default()
        },
    );
    sched.add_accelerator(Accelerator::CpuWorker(CpuWorker::new(0)));
    let bus = sched.completion_bus();

    let rx1 = bus.subscribe(1);
    let rx2 = bus.subscribe(2);
    sched.start().await;
    sched.submit(Arc::new(
        Task::new(1, "a")
            .with_priority(1)
            .with_est_runtime(Duration::from_millis(5)),
    ));
    sched.submit(Arc::new(
        Task::new(2, "b")
            .with_priority(1)
            .with_depends_on([1])
            .with_est_runtime(Duration::from_millis(5)),
    ));

    assert_eq!(rx1.await, Ok(true));
    assert_eq!(rx2.await, Ok(true));
    sched.stop().await;

    assert_eq!(reported_ids(&buffer), vec![1, 2]);
}

#[tokio::test]
async fn higher_priority_tasks_run_first() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(cpu_app("a"));
    let (sched, buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Cpu,
            cpu_workers: 1,
            ..Default::default()
        },
    );
    sched.add_accelerator(Accelerator::CpuWorker(CpuWorker::new(0)));
    let bus = sched.completion_bus();
    let receivers: Vec<_> = (1..=3).map(|id| bus.subscribe(id)).collect();

    // Submitted before start: the queue orders them, not arrival.
    for (id, priority) in [(1u64, 1), (2, 5), (3, 5)] {
        sched.submit(Arc::new(
            Task::new(id, "a")
                .with_priority(priority)
                .with_est_runtime(Duration::from_millis(2)),
        ));
    }
    sched.start().await;
    for rx in receivers {
        assert_eq!(rx.await, Ok(true));
    }
    sched.stop().await;

    assert_eq!(reported_ids(&buffer), vec![2, 3, 1]);
}

#[tokio::test]
async fn preload_programs_an_idle_slot() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(overlay_app("fft", ResourceKind::Fft));
    registry.register_app(overlay_app("zip", ResourceKind::Zip));
    let (sched, _buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Auto,
            cpu_workers: 1,
            preload_threshold: 2,
            ..Default::default()
        },
    );
    let loader0 = Arc::new(MockBitstreamLoader::new());
    let loader1 = Arc::new(MockBitstreamLoader::new());
    sched.add_accelerator(Accelerator::FpgaSlot(FpgaSlot::mock_with_loader(
        0,
        loader0.clone(),
    )));
    sched.add_accelerator(Accelerator::FpgaSlot(FpgaSlot::mock_with_loader(
        1,
        loader1.clone(),
    )));
    let bus = sched.completion_bus();

    sched.start().await;

    // Occupy the only worker (and slot 0) with a long zip task, then pile
    // up fft demand: the threshold crossing should preload fft into the
    // idle slot 1 while slot 0 is still executing.
    let rx_zip = bus.subscribe(10);
    sched.submit(Arc::new(
        Task::new(10, "zip")
            .with_required(ResourceKind::Zip)
            .with_est_runtime(Duration::from_millis(80)),
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let rx_fft: Vec<_> = (11..=12).map(|id| bus.subscribe(id)).collect();
    for id in 11..=12u64 {
        sched.submit(Arc::new(
            Task::new(id, "fft")
                .with_required(ResourceKind::Fft)
                .with_est_runtime(Duration::from_millis(5)),
        ));
    }

    assert_eq!(rx_zip.await, Ok(true));
    for rx in rx_fft {
        assert_eq!(rx.await, Ok(true));
    }
    sched.stop().await;

    // Slot 1 was programmed by the preload heuristic, not by selection:
    // by the time the worker got to the fft tasks, the overlay was already
    // resident there.
    let slot1_loads = loader1.loads();
    assert!(
        slot1_loads
            .iter()
            .any(|l| l.partial && l.path.to_string_lossy().contains("fft")),
        "expected a preloaded fft overlay on slot 1, saw {slot1_loads:?}"
    );
}

#[tokio::test]
async fn zero_threshold_disables_preloading() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(overlay_app("fft", ResourceKind::Fft));
    let (sched, _buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Fpga,
            cpu_workers: 1,
            preload_threshold: 0,
            ..Default::default()
        },
    );
    let loader0 = Arc::new(MockBitstreamLoader::new());
    let loader1 = Arc::new(MockBitstreamLoader::new());
    sched.add_accelerator(Accelerator::FpgaSlot(FpgaSlot::mock_with_loader(
        0,
        loader0.clone(),
    )));
    sched.add_accelerator(Accelerator::FpgaSlot(FpgaSlot::mock_with_loader(
        1,
        loader1.clone(),
    )));
    let bus = sched.completion_bus();

    sched.start().await;
    let receivers: Vec<_> = (1..=4).map(|id| bus.subscribe(id)).collect();
    for id in 1..=4u64 {
        sched.submit(Arc::new(
            Task::new(id, "fft")
                .with_required(ResourceKind::Fft)
                .with_est_runtime(Duration::from_millis(2)),
        ));
    }
    for rx in receivers {
        assert_eq!(rx.await, Ok(true));
    }
    sched.stop().await;

    // Only dispatch loads the overlay: one load on the first slot, nothing
    // speculative on the second.
    assert_eq!(loader0.load_count(), 1);
    assert_eq!(loader1.load_count(), 0);
}

#[tokio::test]
async fn overlay_load_failure_falls_back_to_cpu_worker() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(overlay_app("fft", ResourceKind::Fft));
    let (sched, buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Auto,
            cpu_workers: 1,
            ..Default::default()
        },
    );
    let loader = Arc::new(MockBitstreamLoader::new());
    loader.fail_all();
    sched.add_accelerator(Accelerator::FpgaSlot(FpgaSlot::mock_with_loader(0, loader)));
    sched.add_accelerator(Accelerator::CpuWorker(CpuWorker::new(0)));
    let bus = sched.completion_bus();

    sched.start().await;
    let rx = bus.subscribe(1);
    sched.submit(Arc::new(
        Task::new(1, "fft")
            .with_required(ResourceKind::Fft)
            .with_est_runtime(Duration::from_millis(2)),
    ));
    assert_eq!(rx.await, Ok(true));
    sched.stop().await;

    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    assert!(
        lines[0].contains("cpu-worker-0"),
        "expected CPU execution, got: {}",
        lines[0]
    );
}

#[tokio::test]
async fn failed_task_starves_dependents() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(cpu_app("a"));
    let (sched, buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Cpu,
            cpu_workers: 2,
            ..Default::default()
        },
    );
    sched.add_accelerator(Accelerator::CpuWorker(CpuWorker::new(0)));
    let bus = sched.completion_bus();

    sched.start().await;
    let rx1 = bus.subscribe(1);
    let rx2 = bus.subscribe(2);
    // Task 1 names an app nobody registered.
    sched.submit(Arc::new(Task::new(1, "mystery")));
    sched.submit(Arc::new(Task::new(2, "a").with_depends_on([1])));

    assert_eq!(rx1.await, Ok(false));
    // The dependent must not surface before shutdown.
    let starved = tokio::time::timeout(Duration::from_millis(50), rx2).await;
    assert!(starved.is_err(), "dependent of a failed task must stay parked");
    sched.stop().await;

    assert_eq!(reported_ids(&buffer), vec![1]);
    let line = &buffer.lines()[0];
    assert!(line.contains("Unknown app: mystery"), "got: {line}");
}

#[tokio::test]
async fn empty_app_name_fails_at_run_time() {
    let registry = Arc::new(AppRegistry::new());
    let (sched, _buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Cpu,
            cpu_workers: 1,
            ..Default::default()
        },
    );
    sched.add_accelerator(Accelerator::CpuWorker(CpuWorker::new(0)));
    let bus = sched.completion_bus();

    sched.start().await;
    let rx = bus.subscribe(1);
    sched.submit(Arc::new(Task::new(1, "")));
    assert_eq!(rx.await, Ok(false));
    sched.stop().await;
}

#[tokio::test]
async fn no_accelerator_available_fails_the_task() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(cpu_app("a"));
    let (sched, buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Cpu,
            cpu_workers: 1,
            ..Default::default()
        },
    );
    let bus = sched.completion_bus();

    sched.start().await;
    let rx = bus.subscribe(1);
    sched.submit(Arc::new(Task::new(1, "a")));
    assert_eq!(rx.await, Ok(false));
    sched.stop().await;

    assert!(buffer.lines()[0].contains("No accelerator available"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_completions_under_contention() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(cpu_app("a"));
    let (sched, buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Cpu,
            cpu_workers: 4,
            ..Default::default()
        },
    );
    for id in 0..4 {
        sched.add_accelerator(Accelerator::CpuWorker(CpuWorker::new(id)));
    }
    let bus = sched.completion_bus();

    sched.start().await;
    let receivers: Vec<_> = (1..=100).map(|id| bus.subscribe(id)).collect();
    for id in 1..=100u64 {
        sched.submit(Arc::new(
            Task::new(id, "a").with_est_runtime(Duration::from_millis(1)),
        ));
    }
    for rx in receivers {
        assert_eq!(rx.await, Ok(true));
    }
    sched.stop().await;

    let mut ids = reported_ids(&buffer);
    ids.sort_unstable();
    assert_eq!(ids, (1..=100).collect::<Vec<_>>());
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(cpu_app("a"));
    let (sched, buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Cpu,
            cpu_workers: 1,
            ..Default::default()
        },
    );
    sched.add_accelerator(Accelerator::CpuWorker(CpuWorker::new(0)));
    let bus = sched.completion_bus();

    sched.start().await;
    sched.start().await;
    let rx = bus.subscribe(1);
    sched.submit(Arc::new(Task::new(1, "a")));
    assert_eq!(rx.await, Ok(true));
    sched.stop().await;
    sched.stop().await;

    assert_eq!(reported_ids(&buffer), vec![1]);
}

#[tokio::test]
async fn dma_failure_falls_back_to_cpu_kernel_on_same_task() {
    let registry = Arc::new(AppRegistry::new());
    registry.register_app(overlay_app("fft", ResourceKind::Fft));
    let (sched, buffer) = capture_scheduler(
        registry,
        SchedulerConfig {
            backend_mode: BackendMode::Fpga,
            cpu_workers: 1,
            ..Default::default()
        },
    );

    // A real-mode slot whose DMA engine always fails: the hardware attempt
    // aborts and the CPU kernel finishes the same context.
    let dma = Arc::new(MockDmaEngine::new());
    dma.fail_transfers();
    let region = {
        let dir = std::env::temp_dir().join(format!("dashrt-sched-dma-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("size"), "4096\n").unwrap();
        std::fs::write(dir.join("phys_addr"), "0x70000000\n").unwrap();
        let dev = dir.join("udmabuf0");
        std::fs::write(&dev, vec![0u8; 4096]).unwrap();
        dashrt_hw::UdmabufRegion::open_at("udmabuf0", &dir, &dev, 4096).unwrap()
    };
    let runner = Arc::new(dashrt_sched::FftDmaRunner::new(dma, region));
    sched.add_accelerator(Accelerator::FpgaSlot(FpgaSlot::new(
        0,
        FpgaSlotOptions {
            mock_mode: false,
            fft_runner: Some(runner),
            ..Default::default()
        },
        Arc::new(MockBitstreamLoader::new()),
    )));
    let bus = sched.completion_bus();

    sched.start().await;
    let mut params = TaskParams::new();
    let mut input = vec![0.0f32; 16];
    input[0] = 1.0;
    let ctx = params.attach_fft(FftContext::new(FftPlan { n: 8, inverse: false }, input, 16));
    let rx = bus.subscribe(1);
    sched.submit(Arc::new(
        Task::new(1, "fft")
            .with_required(ResourceKind::Fft)
            .with_params(params),
    ));
    assert_eq!(rx.await, Ok(true));
    sched.stop().await;

    assert!(ctx.lock().unwrap().ok);
    let line = &buffer.lines()[0];
    assert!(line.contains("(cpu fallback)"), "got: {line}");
}
