//! 采集调度器 (Capture Scheduler)
//!
//! 定时器线程按固定间隔 (ceil(1000/15) ms) 产生tick; 上一个tick仍在执行时
//! 直接丢弃并计数 (SkipCounter), 不排队。流水线在独立的工作线程上执行,
//! 同一时刻最多一个tick在途。
//!
//! 状态机: Idle → Running → Idle
//! - 信号源首次进入直播之前保持 Idle, 不判定为关闭
//! - 信号源关闭 (尺寸0且无直播流): 清空画布, 停止定时器, 封装录制 (不导出)
//! - 用户停止 `stop(export)`: 等待在途tick完成, 封装录制, 按需导出

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender};

use crate::config::TICK_INTERVAL;
use crate::error::{Error, Result};
use crate::pipeline::frame::{Frame, FrameSource};
use crate::pipeline::{monotonic_us, Pipeline};
use crate::recorder::Finalized;

/// 丢帧计数, 只增不减
#[derive(Clone, Debug, Default)]
pub struct SkipCounter {
    count: Arc<AtomicU64>,
}

impl SkipCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

/// 在途标志: 同一时刻最多一个tick持有 `BusyGuard`
#[derive(Debug, Default)]
pub struct TickGate {
    busy: AtomicBool,
}

impl TickGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 原子地 检查并置位; 已在忙时返回 None
    pub fn try_begin(self: &Arc<Self>) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { gate: self.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// 释放时清除在途标志 (成功或失败都会释放)
#[derive(Debug)]
pub struct BusyGuard {
    gate: Arc<TickGate>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// 信号源是否曾经开播; 开播之前的 (0,0) 只是设备还没打开
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceWatch {
    seen_live: bool,
}

impl SourceWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_live(&self) -> bool {
        self.seen_live
    }

    /// 更新并返回是否已开播
    pub fn observe(&mut self, source: &dyn FrameSource) -> bool {
        if !self.seen_live && source.is_live() {
            self.seen_live = true;
        }
        self.seen_live
    }
}

/// 单个tick的调度结果
#[derive(Debug)]
pub enum TickDecision {
    /// 信号源还没开播
    Waiting,
    /// 信号源已关闭
    SourceEnded,
    /// 上一个tick仍在执行, 已计入丢帧
    Skip,
    /// 还没有可用的帧
    NoFrame,
    Run { frame: Frame, guard: BusyGuard },
}

/// 一次调度判定: 开播检查 → 信号源关闭 → 在途检查 → 取最新帧
pub fn decide(
    gate: &Arc<TickGate>,
    source: &dyn FrameSource,
    skips: &SkipCounter,
    watch: &mut SourceWatch,
) -> TickDecision {
    if !watch.observe(source) {
        return TickDecision::Waiting;
    }
    if source.is_closed() {
        return TickDecision::SourceEnded;
    }
    let Some(guard) = gate.try_begin() else {
        skips.increment();
        return TickDecision::Skip;
    };
    match source.latest_frame() {
        Some(frame) => TickDecision::Run { frame, guard },
        None => TickDecision::NoFrame,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    SourceEnded,
    UserStop,
}

/// 调度结束时的汇总
#[derive(Debug)]
pub struct FinishReport {
    pub reason: FinishReason,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub skipped: u64,
    /// 录制封装结果; 没有录制时为 `Ok(None)`
    pub recording: Result<Option<Finalized>>,
}

enum Command {
    /// 信号源开播: 开始录制
    Begin { timestamp_us: i64 },
    Tick {
        frame: Frame,
        timestamp_us: i64,
        guard: BusyGuard,
    },
    Finish {
        reason: FinishReason,
        export: bool,
    },
}

pub struct CaptureScheduler {
    interval: Duration,
}

impl Default for CaptureScheduler {
    fn default() -> Self {
        Self::new(TICK_INTERVAL)
    }
}

impl CaptureScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 启动定时器; 信号源开播后才开始录制和检测
    pub fn start(
        &self,
        mut pipeline: Pipeline,
        source: Arc<dyn FrameSource>,
    ) -> Result<SchedulerHandle> {
        let gate = TickGate::new();
        let skips = SkipCounter::new();
        let running = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = unbounded::<Command>();
        let (stop_tx, stop_rx) = bounded::<bool>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker = {
            let skips = skips.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("pipeline-worker".to_string())
                .spawn(move || {
                    let report = run_worker(&mut pipeline, cmd_rx, &skips);
                    running.store(false, Ordering::Release);
                    let _ = done_tx.send(());
                    (pipeline, report)
                })?
        };

        let timer = {
            let interval = self.interval;
            let gate = gate.clone();
            let skips = skips.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("capture-timer".to_string())
                .spawn(move || {
                    run_timer(interval, source, gate, skips, running, cmd_tx, stop_rx)
                })?
        };

        log::info!("⏳ 调度器启动, 间隔 {:?}, 等待信号源开播", self.interval);

        Ok(SchedulerHandle {
            skips,
            running,
            stop_tx,
            done_rx,
            timer: Some(timer),
            worker: Some(worker),
        })
    }
}

fn run_timer(
    interval: Duration,
    source: Arc<dyn FrameSource>,
    gate: Arc<TickGate>,
    skips: SkipCounter,
    running: Arc<AtomicBool>,
    cmd_tx: Sender<Command>,
    stop_rx: Receiver<bool>,
) {
    let ticker = tick(interval);
    let mut watch = SourceWatch::new();
    let finish = loop {
        select! {
            recv(stop_rx) -> msg => {
                let export = msg.unwrap_or(false);
                break Command::Finish { reason: FinishReason::UserStop, export };
            }
            recv(ticker) -> _ => {
                let timestamp_us = monotonic_us();
                let was_live = watch.seen_live();
                let decision = decide(&gate, source.as_ref(), &skips, &mut watch);
                if !was_live && watch.seen_live() {
                    log::info!("▶️ 信号源已开播");
                    running.store(true, Ordering::Release);
                    if cmd_tx.send(Command::Begin { timestamp_us }).is_err() {
                        log::error!("❌ 工作线程已退出");
                        return;
                    }
                }
                match decision {
                    TickDecision::Waiting => {}
                    TickDecision::SourceEnded => {
                        log::info!("⏹️ 信号源已关闭");
                        break Command::Finish { reason: FinishReason::SourceEnded, export: false };
                    }
                    TickDecision::Skip => log::debug!("⏭️ 上一帧仍在处理, 跳过 (累计 {})", skips.get()),
                    TickDecision::NoFrame => {}
                    TickDecision::Run { frame, guard } => {
                        let cmd = Command::Tick { frame, timestamp_us, guard };
                        if cmd_tx.send(cmd).is_err() {
                            log::error!("❌ 工作线程已退出");
                            return;
                        }
                    }
                }
            }
        }
    };
    source.detach();
    let _ = cmd_tx.send(finish);
}

fn run_worker(pipeline: &mut Pipeline, cmd_rx: Receiver<Command>, skips: &SkipCounter) -> FinishReport {
    let mut ticks = 0u64;
    let mut failed_ticks = 0u64;

    for cmd in cmd_rx.iter() {
        match cmd {
            Command::Begin { timestamp_us } => {
                // 录制启动失败时只做检测
                if let Err(e) = pipeline.start_recording(timestamp_us) {
                    log::warn!("⚠️ 录制启动失败, 仅执行检测: {}", e);
                }
            }
            Command::Tick {
                frame,
                timestamp_us,
                guard,
            } => {
                ticks += 1;
                if let Err(e) = pipeline.run_tick(&frame, timestamp_us) {
                    failed_ticks += 1;
                    if e.is_tick_local() {
                        log::warn!("⚠️ 第{}个tick失败: {}", ticks, e);
                    } else {
                        log::error!("❌ 第{}个tick失败: {}", ticks, e);
                    }
                }
                drop(guard);
            }
            Command::Finish { reason, export } => {
                pipeline.clear_surface();
                let recording = pipeline.finish_recording(export);
                log::info!(
                    "📊 调度结束 ({:?}): 执行 {} 个tick, 失败 {}, 丢弃 {}",
                    reason,
                    ticks,
                    failed_ticks,
                    skips.get()
                );
                return FinishReport {
                    reason,
                    ticks,
                    failed_ticks,
                    skipped: skips.get(),
                    recording,
                };
            }
        }
    }

    // 定时器线程异常退出
    pipeline.clear_surface();
    FinishReport {
        reason: FinishReason::SourceEnded,
        ticks,
        failed_ticks,
        skipped: skips.get(),
        recording: pipeline.finish_recording(false),
    }
}

/// 运行中的调度器
pub struct SchedulerHandle {
    skips: SkipCounter,
    running: Arc<AtomicBool>,
    stop_tx: Sender<bool>,
    done_rx: Receiver<()>,
    timer: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<(Pipeline, FinishReport)>>,
}

impl SchedulerHandle {
    /// 累计丢弃的tick数
    pub fn skipped(&self) -> u64 {
        self.skips.get()
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// 调度结束时收到一条消息
    pub fn done(&self) -> &Receiver<()> {
        &self.done_rx
    }

    /// 用户停止; 已经结束时什么也不做
    pub fn stop(&self, export: bool) {
        let _ = self.stop_tx.try_send(export);
    }

    /// 等待调度结束, 取回流水线与汇总
    pub fn wait(mut self) -> Result<(Pipeline, FinishReport)> {
        if let Some(timer) = self.timer.take() {
            timer
                .join()
                .map_err(|_| Error::Scheduler("定时器线程 panic".to_string()))?;
        }
        let worker = self
            .worker
            .take()
            .ok_or_else(|| Error::Scheduler("工作线程已被回收".to_string()))?;
        worker
            .join()
            .map_err(|_| Error::Scheduler("工作线程 panic".to_string()))
    }
}
