use awin_core::Point;
use awin_platform::MonitorInfo;
use tracing::debug;
use x11rb::protocol::randr::{self, ConnectionExt as _};

use crate::context::X11Context;

const ROTATE_90: u16 = 1 << 1;
const ROTATE_270: u16 = 1 << 3;

fn refresh_rate(mode: &randr::ModeInfo) -> f32 {
    let total = f64::from(mode.htotal) * f64::from(mode.vtotal);
    if total == 0.0 {
        return 0.0;
    }
    (f64::from(mode.dot_clock) / total) as f32
}

/// The whole screen as a single monitor, for servers without RandR.
fn screen_monitor(ctx: &X11Context) -> MonitorInfo {
    let screen = ctx.screen();
    let size = Point::new(i32::from(screen.width_in_pixels), i32::from(screen.height_in_pixels));
    let physical = Point::new(
        i32::from(screen.width_in_millimeters),
        i32::from(screen.height_in_millimeters),
    );
    MonitorInfo {
        name: "screen".into(),
        size,
        physical_size_mm: physical,
        scale: awin_core::PointF::splat(ctx.content_scale),
        primary: true,
        ..MonitorInfo::default()
    }
}

pub fn enumerate(ctx: &X11Context) -> Vec<MonitorInfo> {
    if !ctx.randr {
        return vec![screen_monitor(ctx)];
    }
    match enumerate_randr(ctx) {
        Some(monitors) if !monitors.is_empty() => monitors,
        _ => {
            debug!("RandR reported no active outputs");
            vec![screen_monitor(ctx)]
        }
    }
}

fn enumerate_randr(ctx: &X11Context) -> Option<Vec<MonitorInfo>> {
    let conn = &ctx.conn;
    let resources = conn.randr_get_screen_resources_current(ctx.root).ok()?.reply().ok()?;
    let primary = conn
        .randr_get_output_primary(ctx.root)
        .ok()
        .and_then(|cookie| cookie.reply().ok())
        .map_or(x11rb::NONE, |reply| reply.output);

    let mut monitors = Vec::new();
    for &output in &resources.outputs {
        let Some(info) = conn
            .randr_get_output_info(output, resources.config_timestamp)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
        else {
            continue;
        };
        if info.connection != randr::Connection::CONNECTED || info.crtc == x11rb::NONE {
            continue;
        }
        let Some(crtc) = conn
            .randr_get_crtc_info(info.crtc, resources.config_timestamp)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
        else {
            continue;
        };

        let rotated = u16::from(crtc.rotation) & (ROTATE_90 | ROTATE_270) != 0;
        let mut physical = Point::new(info.mm_width as i32, info.mm_height as i32);
        if rotated {
            physical = Point::new(physical.y, physical.x);
        }
        let refresh_hz = resources
            .modes
            .iter()
            .find(|mode| mode.id == crtc.mode)
            .map_or(0.0, refresh_rate);

        monitors.push(MonitorInfo {
            name: String::from_utf8_lossy(&info.name).into_owned(),
            position: Point::new(i32::from(crtc.x), i32::from(crtc.y)),
            size: Point::new(i32::from(crtc.width), i32::from(crtc.height)),
            physical_size_mm: physical,
            // Xft.dpi is the desktop-wide setting every toolkit follows
            scale: awin_core::PointF::splat(ctx.content_scale),
            refresh_hz,
            primary: output == primary,
        });
    }
    // primary first
    monitors.sort_by_key(|monitor| !monitor.primary);
    Some(monitors)
}
