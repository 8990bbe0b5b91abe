//! Connection-wide X11 state: atoms, keyboard, extensions, resources.

use std::fmt::Display;
use std::rc::Rc;

use awin_core::PlatformConfig;
use awin_platform::capability::{self, Requirement};
use awin_platform::wake::WakePipe;
use awin_platform::xkb::{XkbCommon, XkbCompose, XkbContext};
use awin_platform::{PlatformError, Result};
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xkb::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt as _, CreateWindowAux,
    EventMask, Screen, Window, WindowClass,
};
use x11rb::resource_manager::Database;
use x11rb::rust_connection::RustConnection;

use crate::atoms::Atoms;
use crate::keyboard::KeyText;
use crate::keymap::{keysym_to_codepoint, KeyboardMap, Keysym, NO_SYMBOL};
use crate::wm_state::{NetWmAtoms, WmSnapshot};

const USE_CORE_KBD: u16 = 0x100;

pub(crate) fn connection_error(err: impl Display) -> PlatformError {
    PlatformError::Connection(err.to_string())
}

/// Logs a failed fire-and-forget request.
pub(crate) fn checked<T, E: Display>(result: std::result::Result<T, E>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%err, "{what} failed");
            None
        }
    }
}

/// Keysym to text through libxkbcommon when loaded, the built-in Latin
/// table otherwise.
pub struct Composer {
    lib: Option<Rc<XkbCommon>>,
    compose: Option<XkbCompose>,
}

impl Composer {
    fn load() -> Self {
        let lib = match capability::load::<XkbCommon>(Requirement::Optional) {
            Ok(lib) => lib.map(Rc::new),
            Err(err) => {
                warn!(%err, "libxkbcommon unavailable");
                None
            }
        };
        let compose = lib
            .as_ref()
            .and_then(|lib| XkbContext::new(Rc::clone(lib)))
            .and_then(|context| context.compose_state());
        Self { lib, compose }
    }
}

impl KeyText for Composer {
    fn codepoint(&mut self, sym: Keysym) -> Option<u32> {
        if sym == NO_SYMBOL {
            return None;
        }
        let sym = match self.compose.as_mut() {
            Some(compose) => compose.feed(sym)?,
            None => sym,
        };
        match &self.lib {
            Some(lib) => Some(lib.keysym_to_utf32(sym)).filter(|cp| *cp != 0),
            None => keysym_to_codepoint(sym),
        }
    }
}

pub struct X11Context {
    pub conn: RustConnection,
    pub screen_num: usize,
    pub root: Window,
    pub atoms: Atoms,
    pub keyboard: KeyboardMap,
    pub composer: Composer,
    pub detectable_autorepeat: bool,
    pub randr: bool,
    pub xinput: bool,
    pub resources: Database,
    /// Owns the clipboard so it outlives any single window.
    pub helper: Window,
    pub content_scale: f32,
    pub wake: WakePipe,
    pub app_id: String,
}

impl X11Context {
    pub fn connect(config: &PlatformConfig) -> Result<Self> {
        let (conn, screen_num) =
            x11rb::connect(None).map_err(|err| PlatformError::NoDisplay(err.to_string()))?;
        let root = conn.setup().roots[screen_num].root;
        info!(screen = screen_num, root, "connected to X server");

        let atoms = Atoms::new(&conn)
            .map_err(connection_error)?
            .reply()
            .map_err(connection_error)?;

        let detectable_autorepeat = Self::enable_detectable_autorepeat(&conn);
        let randr = capability::negotiate(
            "RandR",
            conn.extension_information(x11rb::protocol::randr::X11_EXTENSION_NAME)
                .map_err(connection_error)?
                .is_some(),
            Requirement::Optional,
        )?;
        let xinput = capability::negotiate(
            "XInput2",
            Self::select_raw_motion(&conn, root),
            Requirement::Optional,
        )?;

        let resources = x11rb::resource_manager::new_from_default(&conn).map_err(connection_error)?;
        let content_scale = Self::scale_from_resources(&resources);

        // root property changes carry RESOURCE_MANAGER updates
        let aux = ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE);
        conn.change_window_attributes(root, &aux)
            .map_err(connection_error)?;

        let helper = conn.generate_id().map_err(connection_error)?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            helper,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )
        .map_err(connection_error)?;

        let keyboard = Self::read_keyboard(&conn)?;
        let wake = WakePipe::new()?;
        conn.flush().map_err(connection_error)?;

        Ok(Self {
            conn,
            screen_num,
            root,
            atoms,
            keyboard,
            composer: Composer::load(),
            detectable_autorepeat,
            randr,
            xinput,
            resources,
            helper,
            content_scale,
            wake,
            app_id: config.app_id.clone(),
        })
    }

    pub fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    fn enable_detectable_autorepeat(conn: &RustConnection) -> bool {
        let supported = conn
            .xkb_use_extension(1, 0)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some_and(|reply| reply.supported);
        if !supported {
            warn!("XKB unavailable, detecting autorepeat by timing");
            return false;
        }
        let flag = xkb::PerClientFlag::DETECTABLE_AUTO_REPEAT;
        let no_ctrls = xkb::BoolCtrl::from(0u32);
        conn.xkb_per_client_flags(USE_CORE_KBD, flag, flag, no_ctrls, no_ctrls, no_ctrls)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some_and(|reply| u32::from(reply.supported) & u32::from(flag) != 0)
    }

    fn select_raw_motion(conn: &RustConnection, root: Window) -> bool {
        let version = conn
            .xinput_xi_query_version(2, 0)
            .ok()
            .and_then(|cookie| cookie.reply().ok());
        if !version.is_some_and(|reply| reply.major_version >= 2) {
            return false;
        }
        let mask = xinput::EventMask {
            deviceid: xinput::Device::ALL_MASTER.into(),
            mask: vec![xinput::XIEventMask::RAW_MOTION],
        };
        conn.xinput_xi_select_events(root, &[mask]).is_ok()
    }

    fn read_keyboard(conn: &RustConnection) -> Result<KeyboardMap> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = conn
            .get_keyboard_mapping(min, max - min + 1)
            .map_err(connection_error)?
            .reply()
            .map_err(connection_error)?;
        Ok(KeyboardMap::new(min, reply.keysyms_per_keycode, reply.keysyms))
    }

    /// Re-reads the keycode table after a `MappingNotify`.
    pub fn refresh_keyboard(&mut self) {
        match Self::read_keyboard(&self.conn) {
            Ok(map) => self.keyboard = map,
            Err(err) => warn!(%err, "keyboard mapping refresh failed"),
        }
    }

    fn scale_from_resources(resources: &Database) -> f32 {
        resources
            .get_string("Xft.dpi", "")
            .and_then(|dpi| dpi.trim().parse::<f32>().ok())
            .filter(|dpi| *dpi > 0.0)
            .map_or(1.0, |dpi| dpi / 96.0)
    }

    /// Reloads `RESOURCE_MANAGER`; returns the new scale when it changed.
    pub fn reload_resources(&mut self) -> Option<f32> {
        let resources = checked(
            x11rb::resource_manager::new_from_default(&self.conn),
            "resource reload",
        )?;
        let scale = Self::scale_from_resources(&resources);
        self.resources = resources;
        if scale == self.content_scale {
            return None;
        }
        debug!(from = self.content_scale, to = scale, "Xft.dpi changed");
        self.content_scale = scale;
        Some(scale)
    }

    pub fn property32(&self, window: Window, property: u32, type_: impl Into<u32>) -> Vec<u32> {
        let reply = self
            .conn
            .get_property(false, window, property, type_.into(), 0, 1024)
            .ok()
            .and_then(|cookie| cookie.reply().ok());
        reply
            .and_then(|reply| reply.value32().map(|values| values.collect()))
            .unwrap_or_default()
    }

    pub fn wm_snapshot(&self, window: Window) -> WmSnapshot {
        let net = self.property32(window, self.atoms._NET_WM_STATE, AtomEnum::ATOM);
        let wm = self.property32(window, self.atoms.WM_STATE, self.atoms.WM_STATE);
        WmSnapshot::from_properties(&self.net_wm(), &net, wm.first().copied())
    }

    pub fn net_wm(&self) -> NetWmAtoms {
        self.atoms.net_wm()
    }

    /// Client message to the root window, as the window manager expects for
    /// state changes.
    pub fn send_to_root(&self, window: Window, message_type: u32, data: [u32; 5]) {
        let event = ClientMessageEvent::new(32, window, message_type, data);
        checked(
            self.conn.send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                event,
            ),
            "root client message",
        );
    }

    pub fn flush(&self) {
        checked(self.conn.flush(), "flush");
    }

    /// Largest property chunk sent in one request.
    pub fn selection_chunk_size(&self) -> usize {
        (self.conn.maximum_request_bytes() / 4).max(4096)
    }
}

impl Drop for X11Context {
    fn drop(&mut self) {
        checked(self.conn.destroy_window(self.helper), "helper window destroy");
        self.flush();
    }
}
