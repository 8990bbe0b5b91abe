//! `wl_shm` buffers backed by a sealed-off memfd.

use std::ffi::CStr;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsFd;

use awin_core::Point;
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use wayland_client::protocol::wl_buffer::WlBuffer;
use wayland_client::protocol::wl_shm::{Format, WlShm};
use wayland_client::protocol::wl_shm_pool::WlShmPool;
use wayland_client::{Dispatch, QueueHandle};

const POOL_NAME: &CStr = c"awin-shm";

pub struct ShmBuffer {
    pub buffer: WlBuffer,
    pool: WlShmPool,
    pub size: Point,
    _file: File,
}

/// Premultiplied ARGB8888 in the little-endian byte order `wl_shm` expects.
fn argb_pixel([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let premultiply = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
    u32::from_be_bytes([a, premultiply(r), premultiply(g), premultiply(b)]).to_le_bytes()
}

impl ShmBuffer {
    /// `pixels` holds `size.x * size.y` premultiplied ARGB8888 pixels.
    pub fn from_argb<D>(
        shm: &WlShm,
        qh: &QueueHandle<D>,
        size: Point,
        pixels: &[u8],
    ) -> io::Result<Self>
    where
        D: Dispatch<WlShmPool, ()> + Dispatch<WlBuffer, ()> + 'static,
    {
        let size = size.max(Point::ONE);
        let stride = size.x * 4;
        let len = (stride * size.y) as usize;
        if pixels.len() != len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "pixel data does not match the size",
            ));
        }

        let fd = memfd_create(POOL_NAME, MemFdCreateFlag::MFD_CLOEXEC)?;
        let mut file = File::from(fd);
        file.write_all(pixels)?;
        file.flush()?;

        let pool = shm.create_pool(file.as_fd(), len as i32, qh, ());
        let buffer = pool.create_buffer(0, size.x, size.y, stride, Format::Argb8888, qh, ());
        Ok(Self {
            buffer,
            pool,
            size,
            _file: file,
        })
    }

    pub fn solid<D>(
        shm: &WlShm,
        qh: &QueueHandle<D>,
        size: Point,
        rgba: [u8; 4],
    ) -> io::Result<Self>
    where
        D: Dispatch<WlShmPool, ()> + Dispatch<WlBuffer, ()> + 'static,
    {
        let size = size.max(Point::ONE);
        let pixel = argb_pixel(rgba);
        let pixels: Vec<u8> = std::iter::repeat(pixel)
            .take((size.x * size.y) as usize)
            .flatten()
            .collect();
        Self::from_argb(shm, qh, size, &pixels)
    }

    pub fn destroy(self) {
        self.buffer.destroy();
        self.pool.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_pixel_layout() {
        // B, G, R, A in memory
        assert_eq!(argb_pixel([0x10, 0x20, 0x30, 0xff]), [0x30, 0x20, 0x10, 0xff]);
    }

    #[test]
    fn test_translucent_pixels_are_premultiplied() {
        assert_eq!(argb_pixel([0xff, 0x00, 0x80, 0x80]), [0x40, 0x00, 0x80, 0x80]);
        assert_eq!(argb_pixel([0xff, 0xff, 0xff, 0x00]), [0, 0, 0, 0]);
    }
}
