//! The capture loops.
//!
//! Both loops poll their readers once per iteration and write a frame only
//! when every reader delivered in that same iteration. Acquisition failures
//! are skipped and retried on the next poll; write failures end the loop.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::frame::{BodyFrame, ColorFrame, DepthFrame, FrameDescription, InfraredFrame};
use crate::output::{FileKind, SessionDir};
use crate::pacing::Pacer;
use crate::skeleton::annotate_body_frame;
use crate::traits::{CameraError, CoordinateMapper, FrameReader, Result};

/// Default rate of the color/depth/infrared capture.
pub const DEFAULT_RGBD_FPS: NonZeroU32 = match NonZeroU32::new(10) {
    Some(fps) => fps,
    None => NonZeroU32::MIN,
};

/// Default rate of the color/body capture.
pub const DEFAULT_BODY_FPS: NonZeroU32 = NonZeroU32::MIN;

/// Parameters of one capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Target frames written per second.
    pub fps: NonZeroU32,
    /// Write one of every `every_frame` complete acquisitions.
    pub every_frame: NonZeroU32,
    /// Stop after this many frames.
    pub max_frames: Option<u32>,
}

impl CaptureOptions {
    /// Defaults of the color/depth/infrared capture.
    #[must_use]
    pub const fn rgbd() -> Self {
        Self {
            fps: DEFAULT_RGBD_FPS,
            every_frame: NonZeroU32::MIN,
            max_frames: None,
        }
    }

    /// Defaults of the color/body capture.
    #[must_use]
    pub const fn body() -> Self {
        Self {
            fps: DEFAULT_BODY_FPS,
            every_frame: NonZeroU32::MIN,
            max_frames: None,
        }
    }

    /// Set the target rate.
    #[must_use]
    pub const fn with_fps(mut self, fps: NonZeroU32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the decimation factor.
    #[must_use]
    pub const fn with_every_frame(mut self, every_frame: NonZeroU32) -> Self {
        self.every_frame = every_frame;
        self
    }

    /// Set the frame limit.
    #[must_use]
    pub const fn with_max_frames(mut self, max_frames: Option<u32>) -> Self {
        self.max_frames = max_frames;
        self
    }
}

/// Outcome of a capture run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Frames written to disk.
    pub frames_written: u32,
    /// Loop iterations.
    pub polls: u64,
    /// Iterations where at least one reader had no frame.
    pub skipped: u64,
    /// Time from the first written frame to the end of the run.
    pub elapsed: Duration,
}

impl CaptureSummary {
    /// Average written frames per second, if any frame was written.
    #[must_use]
    pub fn average_fps(&self) -> Option<f64> {
        let millis = self.elapsed.as_millis();
        if self.frames_written == 0 || millis == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(f64::from(self.frames_written) * 1000.0 / millis as f64)
    }
}

/// Shared loop bookkeeping.
struct LoopState {
    pacer: Pacer,
    options: CaptureOptions,
    frame_no: u32,
    complete: u32,
    first_write: Option<Instant>,
    summary: CaptureSummary,
}

impl LoopState {
    fn new(options: CaptureOptions) -> Self {
        Self {
            pacer: Pacer::new(options.fps),
            options,
            frame_no: 1,
            complete: 0,
            first_write: None,
            summary: CaptureSummary::default(),
        }
    }

    /// Start an iteration. Returns false when the run is over.
    fn begin(&mut self, stop: &AtomicBool) -> bool {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        if self
            .options
            .max_frames
            .is_some_and(|max| self.summary.frames_written >= max)
        {
            return false;
        }
        self.pacer.begin_poll(Instant::now());
        self.summary.polls += 1;
        true
    }

    /// Count a complete acquisition; true when it should be written.
    fn accept(&mut self) -> bool {
        self.complete = self.complete.wrapping_add(1);
        self.complete % self.options.every_frame.get() == 0
    }

    fn skip(&mut self, err: &CameraError) {
        self.summary.skipped += 1;
        if err.is_transient() {
            log::trace!("frame skipped: {err}");
        } else {
            log::debug!("frame skipped: {err}");
        }
    }

    fn written(&mut self) {
        let now = Instant::now();
        self.first_write.get_or_insert(now);
        self.pacer.record_capture(now);
        self.frame_no += 1;
        self.summary.frames_written += 1;
    }

    fn finish(mut self) -> CaptureSummary {
        self.summary.elapsed = self
            .first_write
            .map_or(Duration::ZERO, |first| first.elapsed());
        self.summary
    }
}

/// Check that a converted buffer matches the frame description.
fn check_len(description: &FrameDescription, len: usize, what: &str) -> Result<()> {
    if len == description.byte_len() {
        Ok(())
    } else {
        Err(CameraError::StreamError(format!(
            "{what} frame holds {len} bytes, expected {}",
            description.byte_len()
        )))
    }
}

/// Capture color, depth and infrared frames into `session` until `stop` is set.
///
/// Readers are polled in that order; the first failure skips the rest of the
/// iteration. Each written frame produces `color_NN.raw`, `depth_NN.raw` and
/// `infra_NN.raw`.
pub fn run_rgbd_capture<C, D, I>(
    color: &mut C,
    depth: &mut D,
    infrared: &mut I,
    session: &SessionDir,
    options: &CaptureOptions,
    stop: &AtomicBool,
) -> Result<CaptureSummary>
where
    C: FrameReader<Frame = ColorFrame>,
    D: FrameReader<Frame = DepthFrame>,
    I: FrameReader<Frame = InfraredFrame>,
{
    let mut state = LoopState::new(*options);

    while state.begin(stop) {
        let acquired = color.acquire_latest_frame().and_then(|c| {
            let d = depth.acquire_latest_frame()?;
            let i = infrared.acquire_latest_frame()?;
            Ok((c, d, i))
        });

        match acquired {
            Ok((c, d, i)) => {
                if state.accept() {
                    match prepare_rgbd(&c, &d, &i) {
                        Ok(bgra) => {
                            write_rgbd(session, state.frame_no, &c, &bgra, &d, &i)?;
                            state.written();
                        }
                        Err(err) => state.skip(&err),
                    }
                }
            }
            Err(err) => state.skip(&err),
        }

        state.pacer.wait();
    }

    Ok(state.finish())
}

fn prepare_rgbd(color: &ColorFrame, depth: &DepthFrame, infrared: &InfraredFrame) -> Result<Vec<u8>> {
    let bgra = color.copy_converted_to_bgra();
    check_len(&color.description, bgra.len(), "color")?;
    check_len(&depth.description, depth.data.len() * 2, "depth")?;
    check_len(&infrared.description, infrared.data.len() * 2, "infrared")?;
    Ok(bgra)
}

fn write_rgbd(
    session: &SessionDir,
    frame_no: u32,
    color: &ColorFrame,
    bgra: &[u8],
    depth: &DepthFrame,
    infrared: &InfraredFrame,
) -> Result<()> {
    let FrameDescription { width, height, .. } = color.description;
    log::info!("Color frame {frame_no}  {width} x {height}");
    session.write_color_raw(frame_no, bgra)?;

    let FrameDescription { width, height, .. } = depth.description;
    log::info!("Depth frame {frame_no}  {width} x {height}");
    session.write_u16_raw(FileKind::Depth, frame_no, &depth.data)?;

    let FrameDescription { width, height, .. } = infrared.description;
    log::info!("infra frame {frame_no}  {width} x {height}");
    session.write_u16_raw(FileKind::Infrared, frame_no, &infrared.data)?;
    Ok(())
}

/// Capture color frames with body annotations into `session` until `stop` is set.
///
/// Both readers are polled every iteration. Each written frame produces
/// `body_NN.jpg`, the mirrored color image with tracked joints drawn on it,
/// and `color_NN.raw`.
pub fn run_body_capture<C, B, M>(
    color: &mut C,
    body: &mut B,
    mapper: &M,
    session: &SessionDir,
    options: &CaptureOptions,
    stop: &AtomicBool,
) -> Result<CaptureSummary>
where
    C: FrameReader<Frame = ColorFrame>,
    B: FrameReader<Frame = BodyFrame>,
    M: CoordinateMapper,
{
    let mut state = LoopState::new(*options);

    while state.begin(stop) {
        let color_frame = color.acquire_latest_frame();
        let body_frame = body.acquire_latest_frame();
        log::trace!(
            "acquired{}{}",
            if color_frame.is_ok() { " c" } else { "" },
            if body_frame.is_ok() { " b" } else { "" }
        );

        match (color_frame, body_frame) {
            (Ok(c), Ok(b)) => {
                if state.accept() {
                    if write_body(session, state.frame_no, &c, &b, mapper)? {
                        state.written();
                    } else {
                        state.skip(&CameraError::StreamError(
                            "color frame does not match its description".to_owned(),
                        ));
                    }
                }
            }
            (Err(err), _) | (_, Err(err)) => state.skip(&err),
        }

        state.pacer.wait();
    }

    Ok(state.finish())
}

/// Returns false when the color frame was unusable and nothing was written.
fn write_body<M: CoordinateMapper>(
    session: &SessionDir,
    frame_no: u32,
    color: &ColorFrame,
    bodies: &BodyFrame,
    mapper: &M,
) -> Result<bool> {
    let bgra = color.copy_converted_to_bgra();
    if check_len(&color.description, bgra.len(), "color").is_err() {
        return Ok(false);
    }
    let Some(image) = annotate_body_frame(color, bodies, mapper) else {
        return Ok(false);
    };

    let FrameDescription { width, height, .. } = color.description;
    log::info!("Color image {frame_no}  {width} x {height}");
    session.write_body_jpeg(frame_no, &image)?;

    log::info!("Color frame {frame_no}  {width} x {height}");
    session.write_color_raw(frame_no, &bgra)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a scripted sequence of acquisition results.
    struct Scripted<F> {
        script: VecDeque<Result<F>>,
    }

    impl<F> Scripted<F> {
        fn new(script: Vec<Result<F>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl<F> FrameReader for Scripted<F> {
        type Frame = F;

        fn acquire_latest_frame(&mut self) -> Result<F> {
            self.script
                .pop_front()
                .unwrap_or(Err(CameraError::FrameNotReady))
        }
    }

    /// Counts polls and records when frames were handed out.
    struct Recording<R> {
        inner: R,
        polls: u64,
        delivered: Vec<Instant>,
    }

    impl<R> Recording<R> {
        const fn new(inner: R) -> Self {
            Self {
                inner,
                polls: 0,
                delivered: Vec::new(),
            }
        }
    }

    impl<R: FrameReader> FrameReader for Recording<R> {
        type Frame = R::Frame;

        fn acquire_latest_frame(&mut self) -> Result<R::Frame> {
            self.polls += 1;
            let frame = self.inner.acquire_latest_frame()?;
            self.delivered.push(Instant::now());
            Ok(frame)
        }
    }

    fn color() -> ColorFrame {
        ColorFrame {
            description: FrameDescription::new(2, 2, 4),
            format: crate::frame::ColorImageFormat::Bgra,
            data: vec![7; 16],
            sequence: 0,
        }
    }

    fn depth() -> DepthFrame {
        DepthFrame {
            description: FrameDescription::new(2, 1, 2),
            data: vec![1000, 2000],
            sequence: 0,
        }
    }

    fn infrared() -> InfraredFrame {
        InfraredFrame {
            description: FrameDescription::new(2, 1, 2),
            data: vec![5, 6],
            sequence: 0,
        }
    }

    fn fast() -> CaptureOptions {
        CaptureOptions::rgbd().with_fps(NonZeroU32::new(1000).expect("non-zero"))
    }

    fn session() -> (tempfile::TempDir, SessionDir) {
        let root = tempfile::tempdir().expect("tempdir");
        let session = SessionDir::create(root.path(), &chrono::Local::now()).expect("session");
        (root, session)
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CaptureOptions::rgbd().fps.get(), 10);
        assert_eq!(CaptureOptions::body().fps.get(), 1);
        assert_eq!(CaptureOptions::rgbd().every_frame.get(), 1);
    }

    #[test]
    fn test_average_fps() {
        let summary = CaptureSummary {
            frames_written: 25,
            elapsed: Duration::from_millis(2500),
            ..CaptureSummary::default()
        };
        let fps = summary.average_fps().expect("average");
        assert!((fps - 10.0).abs() < 1e-9);
        assert_eq!(CaptureSummary::default().average_fps(), None);
    }

    #[test]
    fn test_requires_all_sources_in_same_iteration() {
        let (_root, session) = session();
        let mut c = Scripted::new(vec![Ok(color()), Ok(color()), Ok(color())]);
        let mut d = Scripted::new(vec![Err(CameraError::FrameNotReady), Ok(depth()), Ok(depth())]);
        let mut i = Scripted::new(vec![Ok(infrared()), Err(CameraError::Timeout)]);

        // Poll 1: depth missing, infrared not polled. Poll 2: complete.
        // Poll 3: infrared times out. Later polls find the scripts exhausted.
        let stop = AtomicBool::new(false);
        let summary = std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
                stop.store(true, Ordering::Relaxed);
            });
            run_rgbd_capture(&mut c, &mut d, &mut i, &session, &fast(), &stop)
        })
        .expect("capture");

        assert_eq!(summary.frames_written, 1);
        assert_eq!(summary.skipped, summary.polls - 1);
        assert!(session.frame_path(FileKind::Infrared, 1).exists());
        assert!(!session.frame_path(FileKind::Color, 2).exists());
    }

    #[test]
    fn test_writes_numbered_files() {
        let (_root, session) = session();
        let mut c = Scripted::new(vec![Ok(color()), Ok(color())]);
        let mut d = Scripted::new(vec![Ok(depth()), Ok(depth())]);
        let mut i = Scripted::new(vec![Ok(infrared()), Ok(infrared())]);

        let stop = AtomicBool::new(false);
        let options = fast().with_max_frames(Some(2));
        let summary =
            run_rgbd_capture(&mut c, &mut d, &mut i, &session, &options, &stop).expect("capture");

        assert_eq!(summary.frames_written, 2);
        for n in 1..=2 {
            let color_bytes = std::fs::read(session.frame_path(FileKind::Color, n)).expect("color");
            assert_eq!(color_bytes, vec![7; 16]);
            let depth_bytes = std::fs::read(session.frame_path(FileKind::Depth, n)).expect("depth");
            assert_eq!(depth_bytes.len(), 4);
            let infra_bytes =
                std::fs::read(session.frame_path(FileKind::Infrared, n)).expect("infrared");
            assert_eq!(infra_bytes.len(), 4);
        }
        assert!(!session.frame_path(FileKind::Color, 3).exists());
    }

    #[test]
    fn test_every_frame_decimation() {
        let (_root, session) = session();
        let mut c = Scripted::new((0..6).map(|_| Ok(color())).collect());
        let mut d = Scripted::new((0..6).map(|_| Ok(depth())).collect());
        let mut i = Scripted::new((0..6).map(|_| Ok(infrared())).collect());

        let stop = AtomicBool::new(false);
        let options = fast()
            .with_every_frame(NonZeroU32::new(3).expect("non-zero"))
            .with_max_frames(Some(2));
        let summary =
            run_rgbd_capture(&mut c, &mut d, &mut i, &session, &options, &stop).expect("capture");

        assert_eq!(summary.frames_written, 2);
        assert_eq!(summary.polls, 6);
    }

    #[test]
    fn test_mismatched_frame_is_skipped() {
        let (_root, session) = session();
        let mut short = color();
        short.data.truncate(4);
        let mut c = Scripted::new(vec![Ok(short), Ok(color())]);
        let mut d = Scripted::new(vec![Ok(depth()), Ok(depth())]);
        let mut i = Scripted::new(vec![Ok(infrared()), Ok(infrared())]);

        let stop = AtomicBool::new(false);
        let options = fast().with_max_frames(Some(1));
        let summary =
            run_rgbd_capture(&mut c, &mut d, &mut i, &session, &options, &stop).expect("capture");

        assert_eq!(summary.frames_written, 1);
        assert_eq!(summary.skipped, 1);
        assert!(session.frame_path(FileKind::Color, 1).exists());
    }

    #[test]
    fn test_stop_flag_ends_immediately() {
        let (_root, session) = session();
        let mut c = Scripted::new(vec![Ok(color())]);
        let mut d = Scripted::new(vec![Ok(depth())]);
        let mut i = Scripted::new(vec![Ok(infrared())]);

        let stop = AtomicBool::new(true);
        let summary = run_rgbd_capture(&mut c, &mut d, &mut i, &session, &fast(), &stop)
            .expect("capture");
        assert_eq!(summary.polls, 0);
        assert_eq!(summary.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_body_capture_writes_jpeg_and_raw() {
        let (_root, session) = session();
        let mut c = Scripted::new(vec![Ok(color()), Ok(color())]);
        let mut b = Scripted::new(vec![Err(CameraError::FrameNotReady), Ok(BodyFrame::default())]);
        let mapper = crate::body::PinholeMapper::for_resolution(2, 2);

        let stop = AtomicBool::new(false);
        let options = CaptureOptions::body()
            .with_fps(NonZeroU32::new(1000).expect("non-zero"))
            .with_max_frames(Some(1));
        let summary = run_body_capture(&mut c, &mut b, &mapper, &session, &options, &stop)
            .expect("capture");

        assert_eq!(summary.frames_written, 1);
        assert_eq!(summary.skipped, 1);
        assert!(session.frame_path(FileKind::Body, 1).exists());
        assert!(session.frame_path(FileKind::Color, 1).exists());
    }

    #[test]
    fn test_body_reader_polled_when_color_fails() {
        let (_root, session) = session();
        let mut c = Recording::new(Scripted::new(vec![
            Err(CameraError::FrameNotReady),
            Err(CameraError::StreamError("short frame".to_owned())),
            Ok(color()),
        ]));
        let mut b = Recording::new(Scripted::new(
            (0..3).map(|_| Ok(BodyFrame::default())).collect(),
        ));
        let mapper = crate::body::PinholeMapper::for_resolution(2, 2);

        let stop = AtomicBool::new(false);
        let options = CaptureOptions::body()
            .with_fps(NonZeroU32::new(1000).expect("non-zero"))
            .with_max_frames(Some(1));
        let summary = run_body_capture(&mut c, &mut b, &mapper, &session, &options, &stop)
            .expect("capture");

        assert_eq!(summary.frames_written, 1);
        assert_eq!(summary.polls, 3);
        assert_eq!(c.polls, 3);
        assert_eq!(b.polls, 3, "body reader must be polled every iteration");
        assert_eq!(b.delivered.len(), 3);
    }

    #[test]
    fn test_consecutive_writes_spaced_by_period() {
        let (_root, session) = session();
        let mut c = Recording::new(Scripted::new((0..4).map(|_| Ok(color())).collect()));
        let mut d = Scripted::new((0..4).map(|_| Ok(depth())).collect());
        let mut i = Scripted::new((0..4).map(|_| Ok(infrared())).collect());

        let stop = AtomicBool::new(false);
        let options = CaptureOptions::rgbd()
            .with_fps(NonZeroU32::new(50).expect("non-zero"))
            .with_max_frames(Some(4));
        let summary =
            run_rgbd_capture(&mut c, &mut d, &mut i, &session, &options, &stop).expect("capture");

        // Every poll succeeded, so every delivered color frame was written.
        assert_eq!(summary.frames_written, 4);
        assert_eq!(c.delivered.len(), 4);
        // The deadline is armed when a poll starts, just before the color read.
        let period = Duration::from_millis(20);
        let slack = Duration::from_millis(1);
        for pair in c.delivered.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap + slack >= period, "writes {gap:?} apart, period {period:?}");
        }
    }
}
