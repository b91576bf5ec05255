//! Frame dispatcher
//!
//! The calling thread pulls frames from the source, numbers them and queues
//! them for a fixed pool of detection workers. A single aggregator thread
//! collects results and worker faults, applies them to the
//! [`ResultSequencer`] and hands accepted signals to the [`ResultSink`].
//!
//! ```text
//!  source ──► [jobs, bounded] ──► worker 0..N ──► [results] ──┐
//!                                       │                      ├─► aggregator ──► sink
//!                                       └───────► [faults] ───┘
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};

use crate::error::{DetectionError, Result};
use crate::pipeline::sequencer::{Applied, ResultSequencer};
use crate::pipeline::source::FrameSource;
use crate::protocol::Signal;
use crate::vision::ball::Ball;
use crate::vision::hsv::HsvImage;

/// Per-frame detection run on the worker threads
pub trait FrameDetector: Sync {
    fn detect(&self, frame_number: u64, frame: &HsvImage) -> Option<Ball>;
}

/// Receives the in-order signal stream
pub trait ResultSink: Send {
    /// Errors are fatal to the run
    fn deliver(&mut self, frame_number: u64, signal: Signal) -> Result<()>;
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn deliver(&mut self, frame_number: u64, signal: Signal) -> Result<()> {
        (**self).deliver(frame_number, signal)
    }
}

/// Counters of one dispatcher run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatcherStats {
    pub submitted: u64,
    pub accepted: u64,
    pub not_found: u64,
    /// Results discarded as out of order
    pub stale: u64,
    pub worker_faults: u64,
    /// Sum of submission-to-acceptance time over accepted frames
    pub total_latency: Duration,
}

impl DispatcherStats {
    pub fn mean_latency(&self) -> Option<Duration> {
        let nanos = self.total_latency.as_nanos().checked_div(self.accepted as u128)?;
        Some(Duration::from_nanos(nanos as u64))
    }
}

/// Runs detection over a frame source on a worker pool
pub struct FrameDispatcher {
    workers: usize,
    stop: Arc<AtomicBool>,
}

impl FrameDispatcher {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One worker per available core
    pub fn with_available_parallelism() -> Self {
        Self::new(thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }

    /// Share an existing stop flag, e.g. one set by a signal handler
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Ask a running dispatcher to stop submitting and skip queued frames
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run until the source is exhausted, the stop flag is set or the sink
    /// fails. The source is closed in every case.
    pub fn run<S, D, K>(&self, source: &mut S, detector: &D, sink: &mut K) -> Result<DispatcherStats>
    where
        S: FrameSource + ?Sized,
        D: FrameDetector,
        K: ResultSink,
    {
        tracing::info!("Frame dispatcher starting with {} worker(s)", self.workers);
        let result = self.run_inner(source, detector, sink);
        source.close();
        match &result {
            Ok(stats) => tracing::info!(
                "Frame dispatcher finished: {} submitted, {} accepted, {} not found, {} stale, {} faults",
                stats.submitted,
                stats.accepted,
                stats.not_found,
                stats.stale,
                stats.worker_faults
            ),
            Err(e) => tracing::error!("Frame dispatcher stopped with error: {}", e),
        }
        result
    }

    fn run_inner<S, D, K>(&self, source: &mut S, detector: &D, sink: &mut K) -> Result<DispatcherStats>
    where
        S: FrameSource + ?Sized,
        D: FrameDetector,
        K: ResultSink,
    {
        let sequencer = ResultSequencer::new();
        // Raised by the aggregator when the sink fails
        let halt = AtomicBool::new(false);
        let halted = || self.is_stopped() || halt.load(Ordering::SeqCst);

        let (job_tx, job_rx) = bounded::<(u64, HsvImage)>(self.workers * 2);
        let (result_tx, result_rx) = unbounded::<(u64, Option<Ball>)>();
        let (fault_tx, fault_rx) = unbounded::<DetectionError>();

        thread::scope(|scope| -> Result<DispatcherStats> {
            let mut workers = Vec::with_capacity(self.workers);
            for id in 0..self.workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let fault_tx = fault_tx.clone();
                let sequencer = &sequencer;
                let halted = &halted;
                let handle = thread::Builder::new()
                    .name(format!("detector-{}", id))
                    .spawn_scoped(scope, move || {
                        worker_loop(detector, sequencer, halted, job_rx, result_tx, fault_tx)
                    })?;
                workers.push(handle);
            }
            drop(job_rx);
            drop(result_tx);
            drop(fault_tx);

            let aggregator = {
                let sequencer = &sequencer;
                let halt = &halt;
                let sink = &mut *sink;
                thread::Builder::new()
                    .name("aggregator".into())
                    .spawn_scoped(scope, move || {
                        let outcome = aggregate(sequencer, sink, result_rx, fault_rx);
                        if outcome.is_err() {
                            halt.store(true, Ordering::SeqCst);
                        }
                        outcome
                    })?
            };

            let mut submitted = 0u64;
            let mut source_error = None;
            while !halted() {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        let frame_number = submitted + 1;
                        sequencer.register(frame_number);
                        if job_tx.send((frame_number, frame)).is_err() {
                            sequencer.abandon(frame_number);
                            break;
                        }
                        submitted = frame_number;
                        tracing::trace!("Submitted frame {}", frame_number);
                    }
                    Ok(None) => {
                        tracing::info!("Frame source exhausted after {} frame(s)", submitted);
                        break;
                    }
                    Err(e) => {
                        source_error = Some(e);
                        break;
                    }
                }
            }
            if self.is_stopped() {
                tracing::info!("Stop requested, skipping queued frames");
            }
            drop(job_tx);

            for handle in workers {
                // Workers catch detector panics, a join error is a bug in the loop itself
                if handle.join().is_err() {
                    tracing::error!("Detection worker terminated abnormally");
                }
            }
            let mut stats = aggregator
                .join()
                .map_err(|p| DetectionError::AggregatorFault(panic_message(p.as_ref())))??;
            stats.submitted = submitted;

            if let Some(e) = source_error {
                return Err(e.into());
            }
            Ok(stats)
        })
    }
}

fn worker_loop(
    detector: &impl FrameDetector,
    sequencer: &ResultSequencer,
    halted: &(impl Fn() -> bool + Sync),
    jobs: Receiver<(u64, HsvImage)>,
    results: Sender<(u64, Option<Ball>)>,
    faults: Sender<DetectionError>,
) {
    for (frame_number, frame) in jobs.iter() {
        if halted() {
            sequencer.abandon(frame_number);
            continue;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(frame_number, &frame))) {
            Ok(ball) => {
                if results.send((frame_number, ball)).is_err() {
                    sequencer.abandon(frame_number);
                }
            }
            Err(payload) => {
                let _ = faults.send(DetectionError::WorkerFault {
                    frame_number,
                    message: panic_message(payload.as_ref()),
                });
            }
        }
    }
}

fn aggregate<K: ResultSink + ?Sized>(
    sequencer: &ResultSequencer,
    sink: &mut K,
    results: Receiver<(u64, Option<Ball>)>,
    faults: Receiver<DetectionError>,
) -> Result<DispatcherStats> {
    let mut stats = DispatcherStats::default();
    let closed_results = never();
    let closed_faults = never();
    let mut results_open = true;
    let mut faults_open = true;

    while results_open || faults_open {
        let results = if results_open { &results } else { &closed_results };
        let faults = if faults_open { &faults } else { &closed_faults };
        select! {
            recv(results) -> msg => match msg {
                Ok((frame_number, ball)) => {
                    let signal = match &ball {
                        Some(ball) => Signal::Angle(ball.angle()),
                        None => Signal::NotFound,
                    };
                    sequencer.apply(frame_number, |applied| -> Result<()> {
                        match applied {
                            Applied::Accepted { latency } => {
                                stats.accepted += 1;
                                if let Some(latency) = latency {
                                    stats.total_latency += latency;
                                }
                                if ball.is_none() {
                                    stats.not_found += 1;
                                }
                                tracing::debug!("Frame {}: {:?}", frame_number, signal);
                                sink.deliver(frame_number, signal)
                            }
                            Applied::Stale => {
                                stats.stale += 1;
                                sink.deliver(frame_number, Signal::WrongOrder)
                            }
                        }
                    })?;
                }
                Err(_) => results_open = false,
            },
            recv(faults) -> msg => match msg {
                Ok(fault) => {
                    if let DetectionError::WorkerFault { frame_number, .. } = &fault {
                        sequencer.abandon(*frame_number);
                    }
                    stats.worker_faults += 1;
                    tracing::error!("{}", fault);
                }
                Err(_) => faults_open = false,
            },
        }
    }
    Ok(stats)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
