//! Per-window protocol objects: the content surface, its xdg roles, the
//! optional scaling objects and the fallback decoration sub-surfaces.

use awin_core::{Point, WindowFlags, WindowId, WindowState, BORDER_WIDTH, CAPTION_HEIGHT};
use tracing::{debug, warn};
use wayland_client::protocol::wl_output::WlOutput;
use wayland_client::protocol::wl_subsurface::WlSubsurface;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::QueueHandle;
use wayland_protocols::wp::fractional_scale::v1::client::{
    wp_fractional_scale_v1::WpFractionalScaleV1,
};
use wayland_protocols::wp::viewporter::client::wp_viewport::WpViewport;
use wayland_protocols::xdg::decoration::zv1::client::{
    zxdg_toplevel_decoration_v1::ZxdgToplevelDecorationV1,
};
use wayland_protocols::xdg::shell::client::xdg_surface::XdgSurface;
use wayland_protocols::xdg::shell::client::xdg_toplevel::XdgToplevel;

use crate::buffer::ShmBuffer;
use crate::configure::ConfigureTracker;
use crate::decor::{self, DecorPart};
use crate::state::{Globals, SurfaceRole, WaylandState};
use crate::translate::WaylandInput;

const DEFAULT_BACKGROUND: [u8; 4] = [0, 0, 0, 0xff];

struct DecorSurface {
    part: DecorPart,
    surface: WlSurface,
    subsurface: WlSubsurface,
    buffer: Option<ShmBuffer>,
}

/// Caption and borders drawn by the client when the compositor will not.
pub struct FallbackDecor {
    parts: Vec<DecorSurface>,
}

impl FallbackDecor {
    fn new(
        globals: &Globals,
        qh: &QueueHandle<WaylandState>,
        parent: &WlSurface,
        window: WindowId,
    ) -> Option<Self> {
        let subcompositor = globals.subcompositor.as_ref()?;
        let parts = DecorPart::ALL
            .into_iter()
            .map(|part| {
                let surface = globals
                    .compositor
                    .create_surface(qh, SurfaceRole::Decoration(window, part));
                let subsurface = subcompositor.get_subsurface(&surface, parent, qh, ());
                DecorSurface {
                    part,
                    surface,
                    subsurface,
                    buffer: None,
                }
            })
            .collect();
        debug!(?window, "fallback decorations created");
        Some(Self { parts })
    }

    fn layout(
        &mut self,
        globals: &Globals,
        qh: &QueueHandle<WaylandState>,
        content: Point,
        scale: i32,
    ){
        for part in &mut self.parts {
            let geometry = decor::part_geometry(part.part, content);
            part.subsurface.set_position(geometry.offset.x, geometry.offset.y);
            let pixels = geometry.size * scale;
            match ShmBuffer::solid(&globals.shm, qh, pixels, part.part.color()) {
                Ok(buffer) => {
                    part.surface.set_buffer_scale(scale);
                    part.surface.attach(Some(&buffer.buffer), 0, 0);
                    part.surface.damage_buffer(0, 0, pixels.x, pixels.y);
                    if let Some(old) = part.buffer.replace(buffer) {
                        old.destroy();
                    }
                }
                Err(err) => warn!(%err, part = ?part.part, "decoration buffer allocation failed"),
            }
            // cached until the parent commits
            part.surface.commit();
        }
    }

    fn destroy(self) {
        for part in self.parts {
            part.subsurface.destroy();
            part.surface.destroy();
            if let Some(buffer) = part.buffer {
                buffer.destroy();
            }
        }
    }
}

pub struct WaylandWindow {
    pub state: WindowState,
    pub input: WaylandInput,
    pub surface: WlSurface,
    pub xdg_surface: XdgSurface,
    pub toplevel: XdgToplevel,
    pub decoration: Option<ZxdgToplevelDecorationV1>,
    pub fractional: Option<WpFractionalScaleV1>,
    pub viewport: Option<WpViewport>,
    pub configure: ConfigureTracker,
    /// Set by the decoration manager; false until it says otherwise.
    pub server_decorated: bool,
    /// A sub-compositor exists to build fallback decorations with.
    pub can_decorate: bool,
    /// The compositor has sent the first configure since the last map.
    pub mapped: bool,
    /// Integer scale of the outputs the surface is on.
    pub buffer_scale: i32,
    pub outputs: Vec<WlOutput>,
    fallback: Option<FallbackDecor>,
    buffer: Option<ShmBuffer>,
    background: [u8; 4],
}

impl WaylandWindow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: WindowState,
        surface: WlSurface,
        xdg_surface: XdgSurface,
        toplevel: XdgToplevel,
        decoration: Option<ZxdgToplevelDecorationV1>,
        fractional: Option<WpFractionalScaleV1>,
        viewport: Option<WpViewport>,
        background: Option<[u8; 4]>,
    ) -> Self {
        Self {
            state,
            input: WaylandInput::default(),
            surface,
            xdg_surface,
            toplevel,
            decoration,
            fractional,
            viewport,
            configure: ConfigureTracker::new(),
            server_decorated: false,
            can_decorate: false,
            mapped: false,
            buffer_scale: 1,
            outputs: Vec::new(),
            fallback: None,
            buffer: None,
            background: background.unwrap_or(DEFAULT_BACKGROUND),
        }
    }

    /// Whether client-side decorations should frame the window in the given
    /// fullscreen state.
    pub fn wants_fallback(&self, fullscreen: bool) -> bool {
        self.can_decorate
            && self.state.flags.contains(WindowFlags::DECORATED)
            && !self.server_decorated
            && !fullscreen
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Converts a compositor-proposed window-geometry size to a content size.
    pub fn content_size(&self, proposed: Point, fullscreen: bool) -> Point {
        if self.wants_fallback(fullscreen) {
            (proposed - Point::new(2 * BORDER_WIDTH, CAPTION_HEIGHT + BORDER_WIDTH)).max(Point::ONE)
        } else {
            proposed
        }
    }

    /// Creates or removes the fallback decorations to match the flags.
    pub fn sync_decorations(&mut self, globals: &Globals, qh: &QueueHandle<WaylandState>) {
        let wanted = self.wants_fallback(self.state.is_fullscreen());
        match (wanted, self.fallback.is_some()) {
            (true, false) => {
                self.fallback = FallbackDecor::new(globals, qh, &self.surface, self.state.id);
            }
            (false, true) => {
                if let Some(fallback) = self.fallback.take() {
                    fallback.destroy();
                }
            }
            _ => {}
        }
    }

    fn scaled_pixels(&self) -> (Point, i32) {
        let size = self.state.dimensions.max(Point::ONE);
        match (&self.fractional, &self.viewport) {
            (Some(_), Some(_)) => {
                let scale = self.state.content_scale;
                ((size.as_vec2() * scale).round().as_ivec2().max(Point::ONE), 1)
            }
            _ => (size * self.buffer_scale, self.buffer_scale),
        }
    }

    /// Attaches a fresh background buffer at the current size and scale and
    /// commits the surface.
    pub fn redraw(&mut self, globals: &Globals, qh: &QueueHandle<WaylandState>) {
        if !self.mapped {
            return;
        }
        let content = self.state.dimensions.max(Point::ONE);
        let (pixels, buffer_scale) = self.scaled_pixels();
        match ShmBuffer::solid(&globals.shm, qh, pixels, self.background) {
            Ok(buffer) => {
                if let Some(viewport) = &self.viewport {
                    viewport.set_destination(content.x, content.y);
                }
                self.surface.set_buffer_scale(buffer_scale);
                self.surface.attach(Some(&buffer.buffer), 0, 0);
                self.surface.damage_buffer(0, 0, pixels.x, pixels.y);
                if let Some(old) = self.buffer.replace(buffer) {
                    old.destroy();
                }
            }
            Err(err) => warn!(%err, window = ?self.state.id, "surface buffer allocation failed"),
        }

        match &mut self.fallback {
            Some(fallback) => {
                fallback.layout(globals, qh, content, self.buffer_scale);
                let frame = decor::frame_size(content);
                self.xdg_surface
                    .set_window_geometry(-BORDER_WIDTH, -CAPTION_HEIGHT, frame.x, frame.y);
            }
            None => self.xdg_surface.set_window_geometry(0, 0, content.x, content.y),
        }
        self.surface.commit();
    }

    /// Detaches the buffer, which unmaps the toplevel.
    pub fn unmap(&mut self) {
        self.surface.attach(None, 0, 0);
        self.surface.commit();
        self.mapped = false;
        self.configure.reset();
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
    }

    pub fn write_size_limits(&self) {
        let limit = self.state.resize_limit;
        if self.state.flags.contains(WindowFlags::RESIZABLE) {
            self.toplevel.set_min_size(limit.x, limit.y);
            self.toplevel.set_max_size(0, 0);
        } else {
            let size = self.state.dimensions;
            self.toplevel.set_min_size(size.x, size.y);
            self.toplevel.set_max_size(size.x, size.y);
        }
    }

    pub fn destroy(mut self) {
        if let Some(fallback) = self.fallback.take() {
            fallback.destroy();
        }
        if let Some(decoration) = self.decoration.take() {
            decoration.destroy();
        }
        if let Some(viewport) = self.viewport.take() {
            viewport.destroy();
        }
        if let Some(fractional) = self.fractional.take() {
            fractional.destroy();
        }
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
    }
}
