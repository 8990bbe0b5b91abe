//! Theme cursors through `x11rb::cursor`, image cursors through Render.

use awin_core::{CursorImage, CursorShape, Point};
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::cursor::Handle;
use x11rb::protocol::render::{self, ConnectionExt as _, CreatePictureAux, PictType};
use x11rb::protocol::xproto::{ConnectionExt as _, CreateGCAux, ImageFormat, Rectangle};

use crate::context::{checked, X11Context};

pub struct CursorLoader {
    theme: Option<Handle>,
    argb32: Option<render::Pictformat>,
    hidden: u32,
}

fn find_argb32(ctx: &X11Context) -> Option<render::Pictformat> {
    let formats = ctx.conn.render_query_pict_formats().ok()?.reply().ok()?;
    formats
        .formats
        .iter()
        .find(|info| {
            let d = &info.direct;
            info.type_ == PictType::DIRECT
                && info.depth == 32
                && d.alpha_shift == 24
                && d.alpha_mask == 0xff
                && d.red_shift == 16
                && d.green_shift == 8
                && d.blue_shift == 0
        })
        .map(|info| info.id)
}

impl CursorLoader {
    pub fn new(ctx: &X11Context) -> Self {
        let theme = Handle::new(&ctx.conn, ctx.screen_num, &ctx.resources)
            .ok()
            .and_then(|cookie| cookie.reply().ok());
        if theme.is_none() {
            warn!("cursor theme unavailable, named cursors fall back to the server default");
        }
        let argb32 = find_argb32(ctx);
        if argb32.is_none() {
            warn!("no ARGB32 picture format, image cursors disabled");
        }
        let mut loader = Self {
            theme,
            argb32,
            hidden: x11rb::NONE,
        };
        loader.hidden = loader
            .image(ctx, &CursorImage::transparent(Point::ONE))
            .or_else(|| Self::blank_core_cursor(ctx))
            .unwrap_or(x11rb::NONE);
        loader
    }

    /// Fully transparent cursor shown while the cursor is hidden.
    pub fn hidden(&self) -> u32 {
        self.hidden
    }

    pub fn standard(&self, ctx: &X11Context, shape: CursorShape) -> Option<u32> {
        let theme = self.theme.as_ref()?;
        [shape.theme_name(), shape.fallback_name()]
            .into_iter()
            .find_map(|name| {
                let cursor = checked(theme.load_cursor(&ctx.conn, name), "cursor load")?;
                (cursor != x11rb::NONE).then(|| {
                    debug!(name, "loaded theme cursor");
                    cursor
                })
            })
    }

    pub fn image(&self, ctx: &X11Context, image: &CursorImage) -> Option<u32> {
        let format = self.argb32?;
        let conn = &ctx.conn;
        let width = u16::try_from(image.size.x).ok()?;
        let height = u16::try_from(image.size.y).ok()?;

        let pixmap = checked(conn.generate_id(), "id allocation")?;
        let gc = checked(conn.generate_id(), "id allocation")?;
        let picture = checked(conn.generate_id(), "id allocation")?;
        let cursor = checked(conn.generate_id(), "id allocation")?;

        checked(conn.create_pixmap(32, pixmap, ctx.root, width, height), "cursor pixmap")?;
        checked(conn.create_gc(gc, pixmap, &CreateGCAux::new()), "cursor gc")?;
        let pixels = image.argb_bytes();
        checked(
            conn.put_image(ImageFormat::Z_PIXMAP, pixmap, gc, width, height, 0, 0, 0, 32, &pixels),
            "cursor upload",
        )?;
        checked(
            conn.render_create_picture(picture, pixmap, format, &CreatePictureAux::new()),
            "cursor picture",
        )?;
        let (hot_x, hot_y) = (image.hotspot.x as u16, image.hotspot.y as u16);
        let created = checked(
            conn.render_create_cursor(cursor, picture, hot_x, hot_y),
            "image cursor",
        );
        checked(conn.render_free_picture(picture), "free picture");
        checked(conn.free_gc(gc), "free gc");
        checked(conn.free_pixmap(pixmap), "free pixmap");
        created.map(|_| cursor)
    }

    /// Depth-1 empty cursor for servers without Render.
    fn blank_core_cursor(ctx: &X11Context) -> Option<u32> {
        let conn = &ctx.conn;
        let pixmap = checked(conn.generate_id(), "id allocation")?;
        let gc = checked(conn.generate_id(), "id allocation")?;
        let cursor = checked(conn.generate_id(), "id allocation")?;
        checked(conn.create_pixmap(1, pixmap, ctx.root, 1, 1), "blank pixmap")?;
        checked(conn.create_gc(gc, pixmap, &CreateGCAux::new().foreground(0)), "blank gc")?;
        let clear = Rectangle { x: 0, y: 0, width: 1, height: 1 };
        checked(conn.poly_fill_rectangle(pixmap, gc, &[clear]), "blank fill")?;
        let created = checked(
            conn.create_cursor(cursor, pixmap, pixmap, 0, 0, 0, 0, 0, 0, 0, 0),
            "blank cursor",
        );
        checked(conn.free_gc(gc), "free gc");
        checked(conn.free_pixmap(pixmap), "free pixmap");
        created.map(|_| cursor)
    }

    pub fn free(&self, ctx: &X11Context, cursor: u32) {
        if cursor != x11rb::NONE && cursor != self.hidden {
            checked(ctx.conn.free_cursor(cursor), "free cursor");
        }
    }

    pub fn release(&self, ctx: &X11Context) {
        if self.hidden != x11rb::NONE {
            checked(ctx.conn.free_cursor(self.hidden), "free cursor");
        }
    }
}
