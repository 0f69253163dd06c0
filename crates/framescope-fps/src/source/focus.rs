//! Focus window and SurfaceView layer resolution.

use framescope_device::ShellTransport;

use crate::{failure::SampleFailure, sample::FrameTarget};

const WINDOW_DUMP: &str = "dumpsys window windows";

/// Extract the focused window from `dumpsys window windows`.
///
/// The last `mCurrentFocus` line wins. On current releases the line looks
/// like `mCurrentFocus=Window{1f2e u0 com.app/com.app.Main}`.
pub fn parse_focus_window(dump: &str) -> Option<String> {
    let line = dump.lines().rev().find(|line| line.contains("mCurrentFocus"))?.trim();
    let tokens: Vec<&str> = line.split(' ').collect();
    let name = match tokens.as_slice() {
        [_, "u0", name, ..] | [_, name, ..] => name.trim_end_matches('}'),
        _ => "",
    };
    if name.is_empty() || name == "null" {
        None
    } else {
        Some(name.to_string())
    }
}

fn package_lines<'a>(list: &'a str, package: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    list.lines()
        .map(str::trim)
        .filter(move |line| !line.is_empty() && line.contains(package))
}

/// Full SurfaceView layer name from `dumpsys SurfaceFlinger --list`.
pub fn parse_surface_view_layer(list: &str, package: &str) -> Option<String> {
    package_lines(list, package)
        .find(|line| line.starts_with("SurfaceView"))
        .or_else(|| package_lines(list, package).last())
        .map(str::to_string)
}

/// Activity-style layer name derived from the SurfaceView line.
///
/// `SurfaceView - com.app/com.app.Main#0` yields the third token;
/// `SurfaceView[com.app/com.app.Main]` has its decorations stripped.
pub fn parse_surface_view_activity(list: &str, package: &str) -> Option<String> {
    match package_lines(list, package).find(|line| line.starts_with("SurfaceView")) {
        Some(line) if line.contains(' ') => line.split(' ').nth(2).map(str::to_string),
        Some(line) => {
            let name: String = line
                .trim_start_matches("SurfaceView")
                .chars()
                .filter(|c| !matches!(*c, '[' | ']' | '-'))
                .collect();
            Some(name.trim().to_string())
        }
        None => package_lines(list, package).last().map(str::to_string),
    }
    .filter(|name| !name.is_empty())
}

/// Escape characters the device shell would otherwise expand.
pub fn escape_window_name(name: &str) -> String {
    name.replace('$', "\\$")
}

/// Package component of a focus window name.
pub fn package_of(window: &str) -> Option<&str> {
    let package = window.split('/').next()?.trim();
    (!package.is_empty()).then_some(package)
}

fn surface_list_command(package: &str) -> String {
    format!("dumpsys SurfaceFlinger --list | grep {package}")
}

pub(crate) async fn list_surfaces<S>(shell: &S, target: &FrameTarget) -> Result<String, SampleFailure>
where
    S: ShellTransport + ?Sized,
{
    let output = shell
        .shell(&surface_list_command(&target.package), &target.device_id)
        .await?;
    Ok(output)
}

/// Resolve the focused window, falling back to the SurfaceView activity.
///
/// The name is returned unescaped; see [`escape_window_name`].
pub async fn resolve_focus_window<S>(shell: &S, target: &FrameTarget) -> Result<String, SampleFailure>
where
    S: ShellTransport + ?Sized,
{
    let dump = shell.shell(WINDOW_DUMP, &target.device_id).await?;
    if let Some(window) = parse_focus_window(&dump) {
        return Ok(window);
    }

    let list = list_surfaces(shell, target).await?;
    parse_surface_view_activity(&list, &target.package).ok_or_else(|| {
        SampleFailure::Semantic(format!("no focus window found for {}", target.package))
    })
}

/// Package of the app currently holding focus, if any.
pub async fn foreground_package<S>(shell: &S, device_id: &str) -> Result<Option<String>, SampleFailure>
where
    S: ShellTransport + ?Sized,
{
    let dump = shell.shell(WINDOW_DUMP, device_id).await?;
    Ok(parse_focus_window(&dump)
        .as_deref()
        .and_then(package_of)
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS: &str = "\
  mInputMethodTarget=null
  mCurrentFocus=Window{1f2e3d u0 com.example.game/com.example.game.MainActivity}
  mFocusedApp=ActivityRecord{9a u0 com.example.game/.MainActivity t12}
";

    const SURFACES: &str = "\
com.example.game/com.example.game.MainActivity#0
SurfaceView - com.example.game/com.example.game.MainActivity#0
Background for SurfaceView - com.example.game/com.example.game.MainActivity#0
";

    #[test]
    fn focus_window_after_user_marker() {
        assert_eq!(
            parse_focus_window(WINDOWS).as_deref(),
            Some("com.example.game/com.example.game.MainActivity")
        );
    }

    #[test]
    fn focus_window_without_user_marker() {
        let dump = "mCurrentFocus=Window{41a8 com.legacy/com.legacy.Home}";
        assert_eq!(
            parse_focus_window(dump).as_deref(),
            Some("com.legacy/com.legacy.Home")
        );
    }

    #[test]
    fn missing_focus_yields_none() {
        assert_eq!(parse_focus_window("mFocusedApp=null\n"), None);
        assert_eq!(parse_focus_window("  mCurrentFocus=null\n"), None);
    }

    #[test]
    fn surface_view_layer_prefers_surface_view_line() {
        assert_eq!(
            parse_surface_view_layer(SURFACES, "com.example.game").as_deref(),
            Some("SurfaceView - com.example.game/com.example.game.MainActivity#0")
        );
        assert_eq!(
            parse_surface_view_activity(SURFACES, "com.example.game").as_deref(),
            Some("com.example.game/com.example.game.MainActivity#0")
        );
    }

    #[test]
    fn bracketed_surface_view_is_stripped() {
        let list = "SurfaceView[com.example.game/com.example.game.MainActivity]\n";
        assert_eq!(
            parse_surface_view_activity(list, "com.example.game").as_deref(),
            Some("com.example.game/com.example.game.MainActivity")
        );
    }

    #[test]
    fn falls_back_to_last_package_line() {
        let list = "com.example.game/com.example.game.Splash#0\ncom.example.game/com.example.game.Main#1\n";
        assert_eq!(
            parse_surface_view_layer(list, "com.example.game").as_deref(),
            Some("com.example.game/com.example.game.Main#1")
        );
        assert_eq!(parse_surface_view_layer("", "com.example.game"), None);
    }

    #[test]
    fn dollar_signs_are_escaped() {
        assert_eq!(
            escape_window_name("com.app/com.app.Outer$Inner"),
            "com.app/com.app.Outer\\$Inner"
        );
        assert_eq!(package_of("com.app/com.app.Main"), Some("com.app"));
    }
}
