//! Per-frame timing from SurfaceFlinger and `gfxinfo framestats`.
//!
//! `dumpsys SurfaceFlinger --latency <layer>` prints the refresh period in
//! nanoseconds followed by up to 128 rows of
//! `intended-vsync vsync completed` timestamps, also in nanoseconds.
//! Frames whose fence has not signalled yet carry `i64::MAX`.

use framescope_device::ShellTransport;
use framescope_types::config::WindowMode;
use tracing::debug;

use crate::{
    failure::{require_output, SampleFailure},
    sample::{FrameTarget, FrameTiming, LatencySample},
    source::focus::{
        escape_window_name, list_surfaces, parse_surface_view_activity,
        parse_surface_view_layer, resolve_focus_window,
    },
};

pub const PENDING_FENCE: i64 = i64::MAX;
const NANOS_PER_SECOND: f64 = 1e9;

// Column indices in a `framestats` CSV row.
const INTENDED_VSYNC: usize = 1;
const VSYNC: usize = 2;
const FRAME_COMPLETED: usize = 13;

fn to_seconds(nanos: i64) -> f64 {
    nanos as f64 / NANOS_PER_SECOND
}

fn timing_from_nanos(raw: [i64; 3]) -> Option<FrameTiming> {
    if raw.contains(&PENDING_FENCE) || raw[1] == 0 {
        return None;
    }
    Some(FrameTiming::new(
        to_seconds(raw[0]),
        to_seconds(raw[1]),
        to_seconds(raw[2]),
    ))
}

/// Parse the refresh period line (nanoseconds) into seconds.
pub fn parse_refresh_period(line: &str) -> Result<f64, SampleFailure> {
    let line = line.trim();
    if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SampleFailure::Parse(format!(
            "refresh period `{line}` is not a number"
        )));
    }
    let nanos: i64 = line
        .parse()
        .map_err(|err| SampleFailure::Parse(format!("refresh period `{line}`: {err}")))?;
    if nanos <= 0 {
        return Err(SampleFailure::Semantic("refresh period is zero".into()));
    }
    Ok(to_seconds(nanos))
}

fn latency_rows(output: &str) -> impl Iterator<Item = [i64; 3]> + '_ {
    output.lines().skip(1).filter_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return None;
        }
        Some([
            fields[0].parse().ok()?,
            fields[1].parse().ok()?,
            fields[2].parse().ok()?,
        ])
    })
}

/// Frame rows from one query, split into usable timings and the rows
/// dropped as pending fences or zero-vsync placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFrames {
    pub timings: Vec<FrameTiming>,
    pub unusable: usize,
}

impl ParsedFrames {
    fn push_raw(&mut self, raw: [i64; 3]) {
        match timing_from_nanos(raw) {
            Some(timing) => self.timings.push(timing),
            None => self.unusable += 1,
        }
    }

    /// Fail when the query produced no usable frame at all.
    pub fn require_frames(self) -> Result<Vec<FrameTiming>, SampleFailure> {
        if !self.timings.is_empty() {
            Ok(self.timings)
        } else if self.unusable > 0 {
            Err(SampleFailure::Semantic(format!(
                "pending-fence-only data ({} rows)",
                self.unusable
            )))
        } else {
            Err(SampleFailure::Semantic("no frame rows in output".into()))
        }
    }
}

/// Parse full `--latency` output into the refresh period and the frame
/// triples.
pub fn parse_latency_output(output: &str) -> Result<(f64, ParsedFrames), SampleFailure> {
    let first = output
        .lines()
        .next()
        .ok_or_else(|| SampleFailure::Transport("latency query returned no output".into()))?;
    let refresh_period = parse_refresh_period(first)?;
    let mut parsed = ParsedFrames::default();
    latency_rows(output).for_each(|raw| parsed.push_raw(raw));
    Ok((refresh_period, parsed))
}

/// Whether `--latency` output carries no usable rows, which happens when
/// the layer name did not match anything.
fn latency_output_is_blank(output: &str) -> bool {
    output.lines().count() <= 1
        || latency_rows(output)
            .last()
            .map_or(true, |row| row[0] == 0)
}

/// Extract frame triples for `activity` from `dumpsys gfxinfo <pkg> framestats`.
///
/// Rows are read after the first `Window` header naming the activity and
/// until the second `PROFILEDATA` marker. Only rows with flags `0` are
/// complete frames.
pub fn parse_framestats(output: &str, activity: &str) -> ParsedFrames {
    let mut found_window = false;
    let mut markers = 0;
    let mut parsed = ParsedFrames::default();

    for line in output.lines() {
        if !found_window {
            if line.contains("Window") && line.contains(activity) {
                found_window = true;
            } else {
                continue;
            }
        }
        if line.contains("PROFILEDATA") {
            markers += 1;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() > FRAME_COMPLETED && fields[0].trim() == "0" {
            let fields_parsed = (
                fields[INTENDED_VSYNC].trim().parse::<i64>(),
                fields[VSYNC].trim().parse::<i64>(),
                fields[FRAME_COMPLETED].trim().parse::<i64>(),
            );
            if let (Ok(intended), Ok(vsync), Ok(completed)) = fields_parsed {
                parsed.push_raw([intended, vsync, completed]);
            }
        }
        if markers == 2 {
            break;
        }
    }
    parsed
}

/// Dedup state carried between latency ticks.
#[derive(Debug, Default, Clone)]
pub struct LatencyCursor {
    last: Option<FrameTiming>,
    chained: bool,
}

impl LatencyCursor {
    /// High-water vsync timestamp in seconds.
    pub fn last_timestamp(&self) -> f64 {
        self.last.map_or(0.0, |frame| frame.vsync)
    }

    /// Forget the chain so the next batch starts fresh. The high-water
    /// mark is kept so frames already reported are not counted twice.
    pub fn break_chain(&mut self) {
        self.chained = false;
    }

    /// Keep only frames newer than the high-water mark. When the previous
    /// tick also produced frames, its last frame is prepended so the span
    /// and deltas cover the gap between batches.
    pub fn advance(&mut self, refresh_period_secs: f64, batch: Vec<FrameTiming>) -> LatencySample {
        let high_water = self.last_timestamp();
        let fresh: Vec<FrameTiming> = batch
            .into_iter()
            .filter(|frame| frame.vsync > high_water)
            .collect();

        let timestamps = match fresh.last().copied() {
            Some(newest) => {
                let mut timestamps = Vec::with_capacity(fresh.len() + 1);
                if let (true, Some(anchor)) = (self.chained, self.last) {
                    timestamps.push(anchor);
                }
                timestamps.extend(fresh);
                self.last = Some(newest);
                self.chained = true;
                timestamps
            }
            None => {
                self.chained = false;
                Vec::new()
            }
        };

        LatencySample {
            refresh_period_secs,
            timestamps,
        }
    }
}

/// SurfaceFlinger latency strategy state.
#[derive(Debug, Default)]
pub struct LatencySource {
    cursor: LatencyCursor,
    window: Option<String>,
}

impl LatencySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: String) -> Self {
        Self {
            cursor: LatencyCursor::default(),
            window: Some(window),
        }
    }

    /// Resolve the window to measure; fails when none can be found.
    pub async fn probe<S>(shell: &S, target: &FrameTarget) -> Result<Self, SampleFailure>
    where
        S: ShellTransport + ?Sized,
    {
        let source = Self::new();
        let window = source.resolve_window(shell, target).await?;
        debug!(%window, mode = ?target.window_mode, "measuring window");
        Ok(Self::with_window(window))
    }

    /// The cached window or layer name, if still considered valid.
    pub fn window(&self) -> Option<&str> {
        self.window.as_deref()
    }

    /// Mark the cached window stale; it is re-resolved on the next sample.
    pub fn invalidate_window(&mut self) {
        self.window = None;
        self.cursor.break_chain();
    }

    async fn resolve_window<S>(&self, shell: &S, target: &FrameTarget) -> Result<String, SampleFailure>
    where
        S: ShellTransport + ?Sized,
    {
        match target.window_mode {
            WindowMode::FullScreen => resolve_focus_window(shell, target).await,
            WindowMode::SurfaceView => {
                let list = list_surfaces(shell, target).await?;
                match parse_surface_view_layer(&list, &target.package) {
                    Some(layer) => Ok(layer),
                    None => resolve_focus_window(shell, target).await,
                }
            }
        }
    }

    async fn fetch_full_screen<S>(
        &self,
        shell: &S,
        target: &FrameTarget,
        window: &str,
    ) -> Result<(f64, ParsedFrames), SampleFailure>
    where
        S: ShellTransport + ?Sized,
    {
        let command = format!(
            "dumpsys SurfaceFlinger --latency {}",
            escape_window_name(window)
        );
        let latency = require_output(
            shell.shell(&command, &target.device_id).await?,
            "latency query",
        )?;
        let refresh_period = parse_refresh_period(latency.lines().next().unwrap_or_default())?;

        let command = format!("dumpsys gfxinfo {} framestats", target.package);
        let stats = require_output(
            shell.shell(&command, &target.device_id).await?,
            "framestats query",
        )?;
        let activity = window.split('#').next().unwrap_or(window);
        Ok((refresh_period, parse_framestats(&stats, activity)))
    }

    async fn fetch_surface_view<S>(
        &mut self,
        shell: &S,
        target: &FrameTarget,
        layer: &str,
    ) -> Result<(f64, ParsedFrames), SampleFailure>
    where
        S: ShellTransport + ?Sized,
    {
        let query = |name: &str| {
            format!(
                "dumpsys SurfaceFlinger --latency \"{}\"",
                escape_window_name(name)
            )
        };
        let mut output = shell.shell(&query(layer), &target.device_id).await?;

        if latency_output_is_blank(&output) {
            let list = list_surfaces(shell, target).await?;
            if let Some(activity) = parse_surface_view_activity(&list, &target.package) {
                debug!(layer, %activity, "latency empty for layer, retrying with activity name");
                output = shell.shell(&query(&activity), &target.device_id).await?;
                self.window = Some(activity);
            }
        }

        let output = require_output(output, "latency query")?;
        parse_latency_output(&output)
    }

    /// Run one latency tick.
    ///
    /// Output without a single usable frame row is a failure. A successful
    /// tick may still carry no timestamps when every row is older than the
    /// high-water mark; the focus window is then re-checked and, if it
    /// moved, the next batch is not chained to this one.
    pub async fn sample<S>(&mut self, shell: &S, target: &FrameTarget) -> Result<LatencySample, SampleFailure>
    where
        S: ShellTransport + ?Sized,
    {
        let window = match self.window.clone() {
            Some(window) => window,
            None => {
                let window = self.resolve_window(shell, target).await?;
                self.window = Some(window.clone());
                window
            }
        };

        let fetched = match target.window_mode {
            WindowMode::FullScreen => self.fetch_full_screen(shell, target, &window).await,
            WindowMode::SurfaceView => self.fetch_surface_view(shell, target, &window).await,
        };
        let fetched = fetched
            .and_then(|(period, parsed)| parsed.require_frames().map(|frames| (period, frames)));
        let (refresh_period, batch) = match fetched {
            Ok(data) => data,
            Err(failure) => {
                self.invalidate_window();
                return Err(failure);
            }
        };

        let sample = self.cursor.advance(refresh_period, batch);
        if sample.timestamps.is_empty() {
            match self.resolve_window(shell, target).await {
                Ok(current) if Some(current.as_str()) != self.window.as_deref() => {
                    debug!(previous = ?self.window, %current, "focus window changed");
                    self.window = Some(current);
                }
                Ok(_) => {}
                Err(failure) => {
                    debug!(%failure, "focus window re-check failed");
                    self.invalidate_window();
                }
            }
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framescope_device::{ScriptedReply, ScriptedShell};

    const LATENCY: &str = "\
16666666
7657467895508\t7657482691352\t7657493499756
7657484466553\t7657499645964\t7657511077881
9223372036854775807\t7657516600576\t9223372036854775807
7657500793457\t7657532600576\t7657527404785
";

    fn target(mode: WindowMode) -> FrameTarget {
        FrameTarget {
            device_id: "emulator-5554".into(),
            package: "com.example.game".into(),
            window_mode: mode,
        }
    }

    fn frame(vsync: f64) -> FrameTiming {
        FrameTiming::new(vsync - 0.004, vsync, vsync + 0.008)
    }

    #[test]
    fn refresh_period_must_be_digits() {
        let period = parse_refresh_period("16666666").expect("valid period");
        assert!((period - 0.016666666).abs() < 1e-12);
        assert!(matches!(
            parse_refresh_period("Permission denial"),
            Err(SampleFailure::Parse(_))
        ));
        assert!(parse_refresh_period("").is_err());
        assert!(matches!(
            parse_refresh_period("0"),
            Err(SampleFailure::Semantic(_))
        ));
    }

    #[test]
    fn pending_fences_are_dropped() {
        let (period, parsed) = parse_latency_output(LATENCY).expect("parse latency");
        assert!((period - 0.016666666).abs() < 1e-12);
        assert_eq!(parsed.timings.len(), 3);
        assert_eq!(parsed.unusable, 1);
        assert!(parsed.timings.iter().all(|t| t.completed < 1e6 && t.vsync < 1e6));
    }

    #[test]
    fn only_pending_rows_yield_no_frames() {
        let output = "16666666\n9223372036854775807 3618832932780 9223372036854775807\n";
        let (_, parsed) = parse_latency_output(output).expect("parse latency");
        assert!(parsed.timings.is_empty());
        assert_eq!(parsed.unusable, 1);
        assert!(matches!(
            parsed.require_frames(),
            Err(SampleFailure::Semantic(_))
        ));

        let (_, parsed) = parse_latency_output("16666666\n0 0 0\n0 0 0\n").expect("parse latency");
        assert_eq!(parsed.unusable, 2);
        assert!(parsed.require_frames().is_err());

        let (_, parsed) = parse_latency_output("16666666\n").expect("parse latency");
        assert!(matches!(
            parsed.require_frames(),
            Err(SampleFailure::Semantic(_))
        ));
    }

    #[test]
    fn blank_latency_output_detected() {
        assert!(latency_output_is_blank("16666666\n"));
        assert!(latency_output_is_blank("16666666\n0 0 0\n0 0 0\n"));
        assert!(!latency_output_is_blank(LATENCY));
    }

    #[test]
    fn framestats_rows_for_focused_window() {
        let stats = "\
Applications Graphics Acceleration Info:
Window: com.other/com.other.Main
---PROFILEDATA---
Flags,IntendedVsync,Vsync,OldestInputEvent,NewestInputEvent,HandleInputStart,AnimationStart,PerformTraversalsStart,DrawStart,SyncQueued,SyncStart,IssueDrawCommandsStart,SwapBuffers,FrameCompleted,
0,1000000000,1000000000,0,0,0,0,0,0,0,0,0,0,1010000000,
---PROFILEDATA---
Window: com.example.game/com.example.game.MainActivity
---PROFILEDATA---
Flags,IntendedVsync,Vsync,OldestInputEvent,NewestInputEvent,HandleInputStart,AnimationStart,PerformTraversalsStart,DrawStart,SyncQueued,SyncStart,IssueDrawCommandsStart,SwapBuffers,FrameCompleted,
0,2000000000,2000000000,0,0,0,0,0,0,0,0,0,0,2012000000,
1,2016000000,2016000000,0,0,0,0,0,0,0,0,0,0,2030000000,
0,2033000000,2033000000,0,0,0,0,0,0,0,0,0,0,2045000000,
0,2050000000,9223372036854775807,0,0,0,0,0,0,0,0,0,0,2060000000,
---PROFILEDATA---
0,3000000000,3000000000,0,0,0,0,0,0,0,0,0,0,3010000000,
";
        let parsed = parse_framestats(stats, "com.example.game/com.example.game.MainActivity");
        assert_eq!(parsed.unusable, 1);
        let timings = parsed.timings;
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].vsync, 2.0);
        assert!((timings[1].completed - 2.045).abs() < 1e-9);
    }

    #[test]
    fn cursor_keeps_only_new_frames_and_chains_batches() {
        let mut cursor = LatencyCursor::default();
        let first = cursor.advance(0.016, vec![frame(1.0), frame(1.016), frame(1.033)]);
        assert_eq!(first.timestamps.len(), 3);

        let second = cursor.advance(0.016, vec![frame(1.016), frame(1.033), frame(1.05), frame(1.066)]);
        assert_eq!(second.timestamps.len(), 3);
        assert_eq!(second.timestamps[0].vsync, 1.033);
        assert_eq!(cursor.last_timestamp(), 1.066);
    }

    #[test]
    fn cursor_does_not_chain_after_a_gap() {
        let mut cursor = LatencyCursor::default();
        cursor.advance(0.016, vec![frame(1.0), frame(1.016)]);
        let idle = cursor.advance(0.016, vec![frame(1.0), frame(1.016)]);
        assert!(idle.timestamps.is_empty());

        let resumed = cursor.advance(0.016, vec![frame(5.0), frame(5.016)]);
        assert_eq!(resumed.timestamps.len(), 2);
        assert_eq!(resumed.timestamps[0].vsync, 5.0);
    }

    #[test]
    fn zero_rows_never_pass_the_high_water_mark() {
        let mut cursor = LatencyCursor::default();
        let sample = cursor.advance(0.016, vec![FrameTiming::new(0.0, 0.0, 0.0)]);
        assert!(sample.timestamps.is_empty());
    }

    #[tokio::test]
    async fn surface_view_sample_end_to_end() {
        let shell = ScriptedShell::new();
        shell
            .on(
                "dumpsys SurfaceFlinger --list",
                ScriptedReply::output("SurfaceView - com.example.game/com.example.game.MainActivity#0\n"),
            )
            .on("dumpsys SurfaceFlinger --latency", ScriptedReply::output(LATENCY));

        let mut source = LatencySource::new();
        let sample = source
            .sample(&shell, &target(WindowMode::SurfaceView))
            .await
            .expect("latency sample");
        assert_eq!(sample.timestamps.len(), 3);
        assert_eq!(
            source.window(),
            Some("SurfaceView - com.example.game/com.example.game.MainActivity#0")
        );
        assert!(shell
            .calls()
            .iter()
            .any(|call| call.contains("--latency \"SurfaceView - com.example.game")));
    }

    #[tokio::test]
    async fn unparsable_refresh_period_invalidates_window() {
        let shell = ScriptedShell::new();
        shell
            .on(
                "dumpsys window windows",
                ScriptedReply::output("mCurrentFocus=Window{1 u0 com.example.game/.Main}\n"),
            )
            .on(
                "dumpsys SurfaceFlinger --latency",
                ScriptedReply::output("Error: unknown option\n"),
            );

        let mut source = LatencySource::new();
        let failure = source
            .sample(&shell, &target(WindowMode::FullScreen))
            .await
            .expect_err("bad refresh period");
        assert!(matches!(failure, SampleFailure::Parse(_)));
        assert_eq!(source.window(), None);
    }

    const MENU_FRAMESTATS: &str = "\
Window: com.example.game/.Menu
---PROFILEDATA---
Flags,IntendedVsync,Vsync,OldestInputEvent,NewestInputEvent,HandleInputStart,AnimationStart,PerformTraversalsStart,DrawStart,SyncQueued,SyncStart,IssueDrawCommandsStart,SwapBuffers,FrameCompleted,
0,2000000000,2000000000,0,0,0,0,0,0,0,0,0,0,2012000000,
0,2016000000,2016000000,0,0,0,0,0,0,0,0,0,0,2028000000,
---PROFILEDATA---
";

    #[tokio::test]
    async fn focus_change_is_picked_up_on_idle_tick() {
        let shell = ScriptedShell::new();
        shell
            .on_sequence(
                "dumpsys window windows",
                vec![
                    ScriptedReply::output("mCurrentFocus=Window{1 u0 com.example.game/.Menu}\n"),
                    ScriptedReply::output("mCurrentFocus=Window{2 u0 com.example.game/.Level}\n"),
                ],
            )
            .on(
                "dumpsys SurfaceFlinger --latency",
                ScriptedReply::output("16666666\n"),
            )
            .on("framestats", ScriptedReply::output(MENU_FRAMESTATS));

        let mut source = LatencySource::new();
        let target = target(WindowMode::FullScreen);
        let first = source.sample(&shell, &target).await.expect("first batch");
        assert_eq!(first.timestamps.len(), 2);

        let idle = source
            .sample(&shell, &target)
            .await
            .expect("idle tick is not a failure");
        assert!(idle.timestamps.is_empty());
        assert_eq!(source.window(), Some("com.example.game/.Level"));
    }

    #[tokio::test]
    async fn pending_fence_only_output_fails_and_invalidates_window() {
        let shell = ScriptedShell::new();
        shell
            .on(
                "dumpsys SurfaceFlinger --list",
                ScriptedReply::output("SurfaceView - com.example.game/com.example.game.MainActivity#0\n"),
            )
            .on(
                "dumpsys SurfaceFlinger --latency",
                ScriptedReply::output(
                    "16666666\n\
9223372036854775807 3618832932780 9223372036854775807\n\
9223372036854775807 3618849599447 9223372036854775807\n",
                ),
            );

        let mut source = LatencySource::new();
        let failure = source
            .sample(&shell, &target(WindowMode::SurfaceView))
            .await
            .expect_err("no usable frames");
        assert!(matches!(failure, SampleFailure::Semantic(_)));
        assert_eq!(source.window(), None);
    }

    #[tokio::test]
    async fn framestats_without_focus_window_is_a_failure() {
        let shell = ScriptedShell::new();
        shell
            .on(
                "dumpsys window windows",
                ScriptedReply::output("mCurrentFocus=Window{1 u0 com.example.game/.Level}\n"),
            )
            .on(
                "dumpsys SurfaceFlinger --latency",
                ScriptedReply::output("16666666\n"),
            )
            .on("framestats", ScriptedReply::output(MENU_FRAMESTATS));

        let mut source = LatencySource::new();
        let failure = source
            .sample(&shell, &target(WindowMode::FullScreen))
            .await
            .expect_err("focus window absent from framestats");
        assert!(matches!(failure, SampleFailure::Semantic(_)));
    }
}
