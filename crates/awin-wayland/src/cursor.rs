//! Cursor surfaces. Named shapes come from the XCursor theme through
//! `wayland-cursor` and may be animated; image cursors are plain shm buffers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use awin_core::{CursorImage, CursorShape, Point};
use tracing::{debug, trace, warn};
use wayland_client::protocol::wl_pointer::WlPointer;
use wayland_client::protocol::wl_shm::WlShm;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::{Connection, QueueHandle};
use wayland_cursor::CursorTheme;

use crate::buffer::ShmBuffer;
use crate::state::WaylandState;

const DEFAULT_THEME_SIZE: u32 = 24;

struct CustomImage {
    buffer: ShmBuffer,
    hotspot: Point,
}

enum Native {
    Shape(CursorShape),
    Image(CustomImage),
}

/// What the pointer should show over the focused surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorChoice {
    Hidden,
    Shape(CursorShape),
    /// A handle from [`CursorManager::register_image`] or
    /// [`CursorManager::register_shape`].
    Handle(u64),
}

struct Animation {
    shape: CursorShape,
    started: Instant,
    next: Instant,
}

pub struct CursorManager {
    theme: Option<CursorTheme>,
    surface: WlSurface,
    cursors: HashMap<u64, Native>,
    next_handle: u64,
    animation: Option<Animation>,
    pointer: Option<(WlPointer, u32)>,
}

impl CursorManager {
    pub fn new(
        conn: &Connection,
        shm: &WlShm,
        surface: WlSurface,
        theme_name: Option<&str>,
        size: Option<u32>,
    ) -> Self {
        let size = size.unwrap_or(DEFAULT_THEME_SIZE);
        let theme = match theme_name {
            Some(name) => CursorTheme::load_or(conn, shm.clone(), name, size),
            None => CursorTheme::load(conn, shm.clone(), size),
        };
        let theme = match theme {
            Ok(theme) => Some(theme),
            Err(err) => {
                warn!(%err, "cursor theme unavailable, named cursors disabled");
                None
            }
        };
        Self {
            theme,
            surface,
            cursors: HashMap::new(),
            next_handle: 1,
            animation: None,
            pointer: None,
        }
    }

    fn allocate(&mut self, native: Native) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.cursors.insert(handle, native);
        handle
    }

    pub fn register_shape(&mut self, shape: CursorShape) -> Option<u64> {
        let theme = self.theme.as_mut()?;
        let known = theme.get_cursor(shape.theme_name()).is_some()
            || theme.get_cursor(shape.fallback_name()).is_some();
        if !known {
            debug!(?shape, "theme has no cursor for shape");
            return None;
        }
        Some(self.allocate(Native::Shape(shape)))
    }

    pub fn register_image(
        &mut self,
        shm: &WlShm,
        qh: &QueueHandle<WaylandState>,
        image: &CursorImage,
    ) -> Option<u64> {
        match ShmBuffer::from_argb(shm, qh, image.size, &image.argb_bytes()) {
            Ok(buffer) => Some(self.allocate(Native::Image(CustomImage {
                buffer,
                hotspot: image.hotspot,
            }))),
            Err(err) => {
                warn!(%err, "cursor image upload failed");
                None
            }
        }
    }

    pub fn release(&mut self, handle: u64) {
        if let Some(Native::Image(image)) = self.cursors.remove(&handle) {
            image.buffer.destroy();
        }
    }

    /// Pointer and enter serial `set_cursor` must quote. Cleared on leave.
    pub fn set_pointer(&mut self, pointer: Option<(WlPointer, u32)>) {
        if pointer.is_none() {
            self.animation = None;
        }
        self.pointer = pointer;
    }

    pub fn apply(&mut self, choice: CursorChoice, now: Instant) {
        let Some((pointer, serial)) = self.pointer.clone() else {
            return;
        };
        self.animation = None;
        let shape = match choice {
            CursorChoice::Hidden => {
                pointer.set_cursor(serial, None, 0, 0);
                return;
            }
            CursorChoice::Shape(shape) => shape,
            CursorChoice::Handle(handle) => match self.cursors.get(&handle) {
                Some(Native::Shape(shape)) => *shape,
                Some(Native::Image(image)) => {
                    let size = image.buffer.size;
                    self.surface.set_buffer_scale(1);
                    self.surface.attach(Some(&image.buffer.buffer), 0, 0);
                    self.surface.damage_buffer(0, 0, size.x, size.y);
                    self.surface.commit();
                    let hotspot = image.hotspot;
                    pointer.set_cursor(serial, Some(&self.surface), hotspot.x, hotspot.y);
                    return;
                }
                None => {
                    debug!(handle, "cursor was destroyed, using the default");
                    CursorShape::Arrow
                }
            },
        };
        if let Some(next) = self.show_frame(shape, Duration::ZERO) {
            self.animation = Some(Animation {
                shape,
                started: now,
                next: now + next,
            });
        }
    }

    /// Attaches the frame of `shape` current at `elapsed`. Returns how long
    /// that frame stays up when the cursor is animated.
    fn show_frame(&mut self, shape: CursorShape, elapsed: Duration) -> Option<Duration> {
        let (pointer, serial) = self.pointer.clone()?;
        let theme = self.theme.as_mut()?;
        let name = if theme.get_cursor(shape.theme_name()).is_some() {
            shape.theme_name()
        } else {
            shape.fallback_name()
        };
        let cursor = theme.get_cursor(name)?;
        let millis = u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX);
        let frame = cursor.frame_and_duration(millis);
        let image = &cursor[frame.frame_index];
        let (width, height) = image.dimensions();
        let (hx, hy) = image.hotspot();

        self.surface.set_buffer_scale(1);
        self.surface.attach(Some(&**image), 0, 0);
        self.surface.damage_buffer(0, 0, width as i32, height as i32);
        self.surface.commit();
        pointer.set_cursor(serial, Some(&self.surface), hx as i32, hy as i32);

        (cursor.image_count() > 1)
            .then(|| Duration::from_millis(u64::from(frame.frame_duration.max(1))))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.animation.as_ref().map(|animation| animation.next)
    }

    /// Advances an animated cursor whose frame is due.
    pub fn tick(&mut self, now: Instant) {
        let Some(animation) = self.animation.as_ref() else {
            return;
        };
        if now < animation.next {
            return;
        }
        let (shape, started) = (animation.shape, animation.started);
        match self.show_frame(shape, now - started) {
            Some(next) => {
                trace!(?shape, "cursor frame");
                if let Some(animation) = self.animation.as_mut() {
                    animation.next = now + next;
                }
            }
            None => self.animation = None,
        }
    }

    pub fn destroy(&mut self) {
        for (_, native) in self.cursors.drain() {
            if let Native::Image(image) = native {
                image.buffer.destroy();
            }
        }
        self.animation = None;
        self.surface.destroy();
    }
}
