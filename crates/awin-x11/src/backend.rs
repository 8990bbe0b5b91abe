use std::collections::{HashMap, HashSet, VecDeque};
use std::os::fd::AsFd;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use awin_core::{
    Cursor, CursorSource, EventDispatchRegistry, PlatformConfig, Point, PointF, WindowConfig,
    WindowFlags, WindowId, WindowState,
};
use awin_platform::wake::wait_readable;
use awin_platform::{Backend, BackendKind, MonitorInfo, PlatformError, Result, Waker};
use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::properties::WmSizeHints;
use x11rb::protocol::xinput::RawMotionEvent;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConfigureWindowAux, ConnectionExt as _, CreateWindowAux,
    EventMask, InputFocus, NotifyMode, PropMode, Property, SelectionNotifyEvent,
    SelectionRequestEvent, WindowClass, SELECTION_NOTIFY_EVENT,
};
use x11rb::protocol::Event;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::CURRENT_TIME;

use crate::context::{checked, connection_error, X11Context};
use crate::cursor::CursorLoader;
use crate::monitor;
use crate::selection::{
    IncomingTransfer, PropertyData, Receive, SelectionOwner, SelectionRequest, WireOp, NONE,
};
use crate::translate::{handle_notification, KeyboardInput, Notification, X11Window};
use crate::wm_state::{ICONIC_STATE, NET_WM_STATE_ADD, NET_WM_STATE_REMOVE};

/// How long a paste or clipboard-manager hand-off may take per step.
const SELECTION_TIMEOUT: Duration = Duration::from_secs(2);
const MOTIF_HINTS_DECORATIONS: u32 = 1 << 1;

fn key_notification(event: &Event) -> Option<Notification> {
    match event {
        Event::KeyPress(e) => Some(Notification::Key {
            window: e.event,
            keycode: e.detail,
            pressed: true,
            time: e.time,
            state: u16::from(e.state),
        }),
        Event::KeyRelease(e) => Some(Notification::Key {
            window: e.event,
            keycode: e.detail,
            pressed: false,
            time: e.time,
            state: u16::from(e.state),
        }),
        _ => None,
    }
}

fn fixed_to_f32(value: &x11rb::protocol::xinput::Fp3232) -> f32 {
    (f64::from(value.integral) + f64::from(value.frac) / 4_294_967_296.0) as f32
}

/// Sums the x and y axes of a raw motion event.
fn raw_delta(event: &RawMotionEvent) -> PointF {
    let mut delta = PointF::ZERO;
    let mut values = event.axisvalues_raw.iter();
    for axis in 0..2u32 {
        let word = event.valuator_mask.get((axis / 32) as usize).copied().unwrap_or(0);
        if word & (1 << (axis % 32)) == 0 {
            continue;
        }
        if let Some(value) = values.next() {
            delta[axis as usize] = fixed_to_f32(value);
        }
    }
    delta
}

pub struct X11Backend {
    ctx: X11Context,
    cursors: CursorLoader,
    registry: Rc<EventDispatchRegistry>,
    windows: HashMap<WindowId, X11Window>,
    by_xid: HashMap<u32, WindowId>,
    next_id: u64,
    queue: VecDeque<Event>,
    owner: SelectionOwner,
    owned_cursors: HashSet<u32>,
    focused: Option<WindowId>,
}

impl X11Backend {
    pub fn new(config: &PlatformConfig, registry: Rc<EventDispatchRegistry>) -> Result<Self> {
        let ctx = X11Context::connect(config)?;
        let cursors = CursorLoader::new(&ctx);
        let owner = SelectionOwner::new(ctx.selection_chunk_size());
        info!(
            detectable_autorepeat = ctx.detectable_autorepeat,
            randr = ctx.randr,
            xinput = ctx.xinput,
            scale = ctx.content_scale,
            "x11 backend ready"
        );
        Ok(Self {
            ctx,
            cursors,
            registry,
            windows: HashMap::new(),
            by_xid: HashMap::new(),
            next_id: 1,
            queue: VecDeque::new(),
            owner,
            owned_cursors: HashSet::new(),
            focused: None,
        })
    }

    fn window(&self, id: WindowId) -> Option<&X11Window> {
        let window = self.windows.get(&id);
        if window.is_none() {
            warn!(window = ?id, "request for an unknown window");
        }
        window
    }

    fn xid(&self, id: WindowId) -> Option<u32> {
        self.window(id).map(|window| window.xid)
    }

    /// Moves everything the server has sent into the local queue.
    fn fetch(&mut self) {
        loop {
            match self.ctx.conn.poll_for_event() {
                Ok(Some(event)) => self.queue.push_back(event),
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "x11 connection error");
                    break;
                }
            }
        }
    }

    fn drain(&mut self) {
        self.ctx.flush();
        self.fetch();
        while let Some(event) = self.queue.pop_front() {
            if matches!(event, Event::KeyRelease(_)) && self.queue.is_empty() {
                // the matching autorepeat press may still be in the socket
                self.fetch();
            }
            let next = self.queue.front().and_then(key_notification);
            self.process(event, next);
        }
        self.ctx.flush();
    }

    fn notify(&mut self, xid: u32, notification: Notification, next: Option<Notification>) {
        let Some(id) = self.by_xid.get(&xid).copied() else {
            return;
        };
        let Self {
            ctx, windows, registry, ..
        } = self;
        let Some(window) = windows.get_mut(&id) else {
            return;
        };
        let mut keyboard = KeyboardInput {
            map: &ctx.keyboard,
            text: &mut ctx.composer,
            detectable_autorepeat: ctx.detectable_autorepeat,
        };
        handle_notification(window, &mut keyboard, registry, &notification, next.as_ref());
    }

    fn process(&mut self, event: Event, next: Option<Notification>) {
        match event {
            Event::KeyPress(_) | Event::KeyRelease(_) => {
                let xid = match &event {
                    Event::KeyPress(e) | Event::KeyRelease(e) => e.event,
                    _ => return,
                };
                if let Some(notification) = key_notification(&event) {
                    self.notify(xid, notification, next);
                }
            }
            Event::ButtonPress(e) | Event::ButtonRelease(e) => {
                let pressed = e.response_type & 0x7f == x11rb::protocol::xproto::BUTTON_PRESS_EVENT;
                let button = Notification::Button {
                    button: e.detail,
                    pressed,
                };
                self.notify(e.event, button, None);
            }
            Event::MotionNotify(e) => {
                let pos = Point::new(i32::from(e.event_x), i32::from(e.event_y));
                self.notify(e.event, Notification::Motion { pos }, None);
            }
            Event::EnterNotify(e) | Event::LeaveNotify(e) => {
                let entered = e.response_type & 0x7f == x11rb::protocol::xproto::ENTER_NOTIFY_EVENT;
                let pos = Point::new(i32::from(e.event_x), i32::from(e.event_y));
                self.notify(e.event, Notification::Crossing { entered, pos }, None);
            }
            Event::FocusIn(e) | Event::FocusOut(e) => {
                let focused = e.response_type & 0x7f == x11rb::protocol::xproto::FOCUS_IN_EVENT;
                let grab = e.mode == NotifyMode::GRAB || e.mode == NotifyMode::UNGRAB;
                self.notify(e.event, Notification::Focus { focused, grab, state: 0 }, None);
                if !grab {
                    if let Some(id) = self.by_xid.get(&e.event).copied() {
                        if focused {
                            self.focused = Some(id);
                        } else if self.focused == Some(id) {
                            self.focused = None;
                        }
                    }
                }
            }
            Event::ConfigureNotify(e) => {
                let synthetic = e.response_type & 0x80 != 0;
                let pos = if synthetic {
                    Point::new(i32::from(e.x), i32::from(e.y))
                } else {
                    // real events are relative to the frame the WM put us in
                    self.ctx
                        .conn
                        .translate_coordinates(e.window, self.ctx.root, 0, 0)
                        .ok()
                        .and_then(|cookie| cookie.reply().ok())
                        .map_or(Point::new(i32::from(e.x), i32::from(e.y)), |reply| {
                            Point::new(i32::from(reply.dst_x), i32::from(reply.dst_y))
                        })
                };
                let size = Point::new(i32::from(e.width), i32::from(e.height));
                self.notify(e.window, Notification::Configure { pos, size }, None);
            }
            Event::MapNotify(e) => self.notify(e.window, Notification::Mapped(true), None),
            Event::UnmapNotify(e) => self.notify(e.window, Notification::Mapped(false), None),
            Event::PropertyNotify(e) => {
                let (net_state, wm_state) = (self.ctx.atoms._NET_WM_STATE, self.ctx.atoms.WM_STATE);
                if e.window == self.ctx.root {
                    if e.atom == u32::from(AtomEnum::RESOURCE_MANAGER) {
                        if let Some(scale) = self.ctx.reload_resources() {
                            let xids: Vec<u32> = self.by_xid.keys().copied().collect();
                            for xid in xids {
                                self.notify(xid, Notification::Scale(scale), None);
                            }
                        }
                    }
                } else if self.by_xid.contains_key(&e.window) {
                    if e.atom == net_state || e.atom == wm_state {
                        let snapshot = self.ctx.wm_snapshot(e.window);
                        self.notify(e.window, Notification::WmState(snapshot), None);
                    }
                } else if e.state == Property::DELETE {
                    let ops = self.owner.on_property_deleted(e.window, e.atom);
                    self.execute(ops);
                }
            }
            Event::ClientMessage(e) => self.client_message(&e),
            Event::SelectionRequest(e) => self.answer_selection(&e),
            Event::SelectionClear(e) => {
                if e.selection == self.ctx.atoms.CLIPBOARD {
                    debug!("clipboard ownership lost");
                    self.owner.clear();
                }
            }
            Event::DestroyNotify(e) => self.owner.forget_requestor(e.window),
            Event::MappingNotify(_) => self.ctx.refresh_keyboard(),
            Event::XinputRawMotion(e) => {
                let Some(id) = self.focused else { return };
                let Some(xid) = self.windows.get(&id).map(|w| w.xid) else { return };
                self.notify(xid, Notification::RawMotion { delta: raw_delta(&e) }, None);
            }
            Event::Error(err) => warn!(?err, "x11 protocol error"),
            other => trace!(?other, "unhandled x11 event"),
        }
    }

    fn client_message(&mut self, event: &x11rb::protocol::xproto::ClientMessageEvent) {
        let atoms = &self.ctx.atoms;
        if event.type_ != atoms.WM_PROTOCOLS || event.format != 32 {
            return;
        }
        let (delete, ping) = (atoms.WM_DELETE_WINDOW, atoms._NET_WM_PING);
        let data = event.data.as_data32();
        if data[0] == delete {
            self.notify(event.window, Notification::Close, None);
        } else if data[0] == ping {
            let mut reply = event.clone();
            reply.window = self.ctx.root;
            checked(
                self.ctx.conn.send_event(
                    false,
                    self.ctx.root,
                    EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                    reply,
                ),
                "ping reply",
            );
        }
    }

    fn answer_selection(&mut self, event: &SelectionRequestEvent) {
        let atoms = self.ctx.atoms.selection();
        let request = SelectionRequest {
            requestor: event.requestor,
            selection: event.selection,
            target: event.target,
            property: event.property,
            time: event.time,
        };
        let atom_pair = self.ctx.atoms.ATOM_PAIR;
        let pairs = (event.target == atoms.multiple && event.property != NONE)
            .then(|| self.ctx.property32(event.requestor, event.property, atom_pair));
        let ops = if event.selection == self.ctx.atoms.CLIPBOARD {
            self.owner.answer(&atoms, &request, pairs.as_deref())
        } else {
            // only the clipboard is offered
            vec![WireOp::Notify {
                requestor: event.requestor,
                selection: event.selection,
                target: event.target,
                property: NONE,
                time: event.time,
            }]
        };
        self.execute(ops);
    }

    fn execute(&self, ops: Vec<WireOp>) {
        let conn = &self.ctx.conn;
        for op in ops {
            match op {
                WireOp::ChangeProperty {
                    window,
                    property,
                    type_,
                    data: PropertyData::Bytes(bytes),
                } => {
                    checked(
                        conn.change_property8(PropMode::REPLACE, window, property, type_, &bytes),
                        "selection write",
                    );
                }
                WireOp::ChangeProperty {
                    window,
                    property,
                    type_,
                    data: PropertyData::Atoms(words),
                } => {
                    checked(
                        conn.change_property32(PropMode::REPLACE, window, property, type_, &words),
                        "selection write",
                    );
                }
                WireOp::WatchProperties { window, enable } => {
                    let mask = if enable {
                        EventMask::PROPERTY_CHANGE
                    } else {
                        EventMask::NO_EVENT
                    };
                    let aux = ChangeWindowAttributesAux::new().event_mask(mask);
                    checked(conn.change_window_attributes(window, &aux), "requestor watch");
                }
                WireOp::Notify {
                    requestor,
                    selection,
                    target,
                    property,
                    time,
                } => {
                    let event = SelectionNotifyEvent {
                        response_type: SELECTION_NOTIFY_EVENT,
                        sequence: 0,
                        time,
                        requestor,
                        selection,
                        target,
                        property,
                    };
                    checked(
                        conn.send_event(false, requestor, EventMask::NO_EVENT, event),
                        "selection notify",
                    );
                }
            }
        }
        self.ctx.flush();
    }

    /// Pumps the connection until `wanted` matches an event or the timeout
    /// passes. Selection traffic is served meanwhile, everything else is
    /// queued for the next poll.
    fn wait_for(
        &mut self,
        timeout: Duration,
        mut wanted: impl FnMut(&Event) -> bool,
    ) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        self.ctx.flush();
        loop {
            match self.ctx.conn.poll_for_event() {
                Ok(Some(event)) if wanted(&event) => return Some(event),
                Ok(Some(Event::SelectionRequest(request))) => self.answer_selection(&request),
                Ok(Some(Event::PropertyNotify(e)))
                    if e.state == Property::DELETE && !self.by_xid.contains_key(&e.window) =>
                {
                    let ops = self.owner.on_property_deleted(e.window, e.atom);
                    self.execute(ops);
                }
                Ok(Some(event)) => self.queue.push_back(event),
                Ok(None) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let fd = self.ctx.conn.stream().as_fd();
                    if let Err(err) = wait_readable(&[fd], Some(deadline - now)) {
                        warn!(%err, "selection wait failed");
                        return None;
                    }
                }
                Err(err) => {
                    warn!(%err, "x11 connection error during selection transfer");
                    return None;
                }
            }
        }
    }

    fn read_selection_property(&self, window: u32) -> Option<(u32, Vec<u8>)> {
        let reply = self
            .ctx
            .conn
            .get_property(
                true,
                window,
                self.ctx.atoms.AWIN_SELECTION,
                AtomEnum::ANY,
                0,
                u32::MAX / 4,
            )
            .ok()?
            .reply()
            .ok()?;
        Some((reply.type_, reply.value))
    }

    fn receive_clipboard(&mut self, window: u32, target: u32) -> Option<String> {
        let atoms = self.ctx.atoms.selection();
        let clipboard = self.ctx.atoms.CLIPBOARD;
        let property = self.ctx.atoms.AWIN_SELECTION;
        checked(
            self.ctx.conn.convert_selection(window, clipboard, target, property, CURRENT_TIME),
            "convert selection",
        )?;

        let notify = self.wait_for(SELECTION_TIMEOUT, |event| {
            matches!(event, Event::SelectionNotify(e)
                if e.requestor == window && e.selection == clipboard)
        })?;
        let Event::SelectionNotify(notify) = notify else {
            return None;
        };
        if notify.property == NONE {
            return None;
        }

        let mut incoming = IncomingTransfer::new();
        let (type_, data) = self.read_selection_property(window)?;
        match incoming.on_notify(&atoms, type_, data) {
            Receive::Done(text) => return Some(text),
            Receive::Failed => return None,
            Receive::Pending => self.ctx.flush(),
        }

        loop {
            self.wait_for(SELECTION_TIMEOUT, |event| {
                matches!(event, Event::PropertyNotify(e)
                    if e.window == window && e.atom == property && e.state == Property::NEW_VALUE)
            })?;
            let (type_, data) = self.read_selection_property(window)?;
            match incoming.on_chunk(&atoms, type_, data) {
                Receive::Done(text) => return Some(text),
                Receive::Failed => return None,
                Receive::Pending => self.ctx.flush(),
            }
        }
    }

    fn owns_clipboard(&self) -> bool {
        self.ctx
            .conn
            .get_selection_owner(self.ctx.atoms.CLIPBOARD)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some_and(|reply| reply.owner == self.ctx.helper)
    }

    /// Hands the clipboard contents to a running clipboard manager so they
    /// survive this process.
    fn hand_off_clipboard(&mut self) {
        if self.owner.text().is_none() || !self.owns_clipboard() {
            return;
        }
        let atoms = &self.ctx.atoms;
        let (manager_atom, save_targets) = (atoms.CLIPBOARD_MANAGER, atoms.SAVE_TARGETS);
        let helper = self.ctx.helper;
        let manager = self
            .ctx
            .conn
            .get_selection_owner(manager_atom)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map_or(NONE, |reply| reply.owner);
        if manager == NONE {
            debug!("no clipboard manager running");
            return;
        }
        info!("handing the clipboard to the clipboard manager");
        if checked(
            self.ctx.conn.convert_selection(helper, manager_atom, save_targets, NONE, CURRENT_TIME),
            "clipboard hand-off",
        )
        .is_none()
        {
            return;
        }
        let acknowledged = self.wait_for(SELECTION_TIMEOUT, |event| {
            matches!(event, Event::SelectionNotify(e)
                if e.requestor == helper && e.target == save_targets)
        });
        if acknowledged.is_none() {
            warn!("clipboard manager did not acknowledge the hand-off");
        }
    }

    fn set_wm_state(&self, xid: u32, add: bool, first: u32, second: u32) {
        let action = if add { NET_WM_STATE_ADD } else { NET_WM_STATE_REMOVE };
        self.ctx
            .send_to_root(xid, self.ctx.atoms._NET_WM_STATE, [action, first, second, 1, 0]);
        self.ctx.flush();
    }

    fn write_size_hints(&self, window: &X11Window) {
        let state = &window.state;
        let mut hints = WmSizeHints::new();
        if state.flags.contains(WindowFlags::RESIZABLE) {
            if state.resize_limit != Point::ZERO {
                hints.min_size = Some((state.resize_limit.x, state.resize_limit.y));
            }
        } else {
            hints.min_size = Some((state.dimensions.x, state.dimensions.y));
            hints.max_size = Some((state.dimensions.x, state.dimensions.y));
        }
        checked(hints.set_normal_hints(&self.ctx.conn, window.xid), "size hints");
    }

    fn write_motif_hints(&self, xid: u32, decorated: bool) {
        let hints = [MOTIF_HINTS_DECORATIONS, 0, u32::from(decorated), 0, 0];
        let atom = self.ctx.atoms._MOTIF_WM_HINTS;
        checked(
            self.ctx.conn.change_property32(PropMode::REPLACE, xid, atom, atom, &hints),
            "motif hints",
        );
    }

    fn apply_cursor(&self, window: &X11Window) {
        let cursor = if window.state.cursor_hidden {
            self.cursors.hidden()
        } else {
            window.state.cursor.upgrade().map_or(x11rb::NONE, |cursor| cursor.handle() as u32)
        };
        let aux = ChangeWindowAttributesAux::new().cursor(cursor);
        checked(
            self.ctx.conn.change_window_attributes(window.xid, &aux),
            "cursor change",
        );
        self.ctx.flush();
    }
}

impl Backend for X11Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::X11
    }

    fn create_window(&mut self, config: &WindowConfig) -> Result<WindowId> {
        let id = WindowId(self.next_id);
        self.next_id += 1;
        let mut state = WindowState::new(id, config);
        state.content_scale = PointF::splat(self.ctx.content_scale);
        let size = state.dimensions;
        let pos = config.position.unwrap_or_default();

        let conn = &self.ctx.conn;
        let atoms = &self.ctx.atoms;
        let xid = conn.generate_id().map_err(connection_error)?;
        let mut aux = CreateWindowAux::new().event_mask(
            EventMask::KEY_PRESS
                | EventMask::KEY_RELEASE
                | EventMask::BUTTON_PRESS
                | EventMask::BUTTON_RELEASE
                | EventMask::POINTER_MOTION
                | EventMask::ENTER_WINDOW
                | EventMask::LEAVE_WINDOW
                | EventMask::FOCUS_CHANGE
                | EventMask::STRUCTURE_NOTIFY
                | EventMask::PROPERTY_CHANGE
                | EventMask::EXPOSURE,
        );
        if let Some([r, g, b, _]) = config.background {
            aux = aux.background_pixel(u32::from_be_bytes([0, r, g, b]));
        }
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            xid,
            self.ctx.root,
            pos.x as i16,
            pos.y as i16,
            size.x as u16,
            size.y as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &aux,
        )
        .map_err(|err| PlatformError::WindowCreation(err.to_string()))?;

        let protocols = [atoms.WM_DELETE_WINDOW, atoms._NET_WM_PING];
        conn.change_property32(
            PropMode::REPLACE,
            xid,
            atoms.WM_PROTOCOLS,
            AtomEnum::ATOM,
            &protocols,
        )
        .map_err(connection_error)?;
        conn.change_property32(
            PropMode::REPLACE,
            xid,
            atoms._NET_WM_PID,
            AtomEnum::CARDINAL,
            &[std::process::id()],
        )
        .map_err(connection_error)?;
        conn.change_property32(
            PropMode::REPLACE,
            xid,
            atoms._NET_WM_WINDOW_TYPE,
            AtomEnum::ATOM,
            &[atoms._NET_WM_WINDOW_TYPE_NORMAL],
        )
        .map_err(connection_error)?;
        let class = format!("{0}\0{0}\0", self.ctx.app_id);
        conn.change_property8(
            PropMode::REPLACE,
            xid,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            class.as_bytes(),
        )
        .map_err(connection_error)?;

        // requested before mapping, confirmed through PropertyNotify
        let mut initial = Vec::new();
        if config.fullscreen {
            initial.push(atoms._NET_WM_STATE_FULLSCREEN);
        }
        if config.maximized {
            initial.extend([
                atoms._NET_WM_STATE_MAXIMIZED_VERT,
                atoms._NET_WM_STATE_MAXIMIZED_HORZ,
            ]);
        }
        if !initial.is_empty() {
            conn.change_property32(
                PropMode::REPLACE,
                xid,
                atoms._NET_WM_STATE,
                AtomEnum::ATOM,
                &initial,
            )
            .map_err(connection_error)?;
        }

        let window = X11Window::new(state, xid);
        self.write_size_hints(&window);
        if !config.decorated {
            self.write_motif_hints(xid, false);
        }
        self.windows.insert(id, window);
        self.by_xid.insert(xid, id);
        self.set_title(id, &config.title);
        info!(window = ?id, xid, title = %config.title, "window created");

        if !config.hidden {
            self.show(id);
        }
        self.ctx.flush();
        Ok(id)
    }

    fn destroy_window(&mut self, id: WindowId) -> Result<()> {
        let window = self.windows.remove(&id).ok_or(PlatformError::UnknownWindow(id.0))?;
        self.by_xid.remove(&window.xid);
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.ctx.conn.destroy_window(window.xid).map_err(connection_error)?;
        self.ctx.flush();
        debug!(window = ?id, "window destroyed");
        Ok(())
    }

    fn window_state(&self, id: WindowId) -> Option<WindowState> {
        self.windows.get(&id).map(|window| window.state.clone())
    }

    fn poll_events(&mut self) {
        self.drain();
    }

    fn wait_events(&mut self, timeout: Option<Duration>) {
        self.ctx.flush();
        self.fetch();
        if self.queue.is_empty() {
            let conn_fd = self.ctx.conn.stream().as_fd();
            let wake_fd = self.ctx.wake.read_fd();
            match wait_readable(&[conn_fd, wake_fd], timeout) {
                Ok(ready) => {
                    if ready.get(1).copied().unwrap_or(false) {
                        self.ctx.wake.drain();
                    }
                }
                Err(err) => warn!(%err, "event wait failed"),
            }
        }
        self.drain();
    }

    fn waker(&self) -> Arc<dyn Waker> {
        self.ctx.wake.waker()
    }

    fn set_title(&mut self, id: WindowId, title: &str) {
        let Some(xid) = self.xid(id) else { return };
        if let Some(window) = self.windows.get_mut(&id) {
            window.state.title = title.to_owned();
        }
        let conn = &self.ctx.conn;
        let atoms = &self.ctx.atoms;
        for property in [atoms._NET_WM_NAME, atoms._NET_WM_ICON_NAME] {
            let utf8 = atoms.UTF8_STRING;
            checked(
                conn.change_property8(PropMode::REPLACE, xid, property, utf8, title.as_bytes()),
                "title",
            );
        }
        let (name, legacy) = (AtomEnum::WM_NAME, AtomEnum::STRING);
        checked(
            conn.change_property8(PropMode::REPLACE, xid, name, legacy, title.as_bytes()),
            "title",
        );
        self.ctx.flush();
    }

    fn set_size(&mut self, id: WindowId, size: Point) {
        let Some(window) = self.window(id) else { return };
        let size = window.state.clamp_to_limit(size).max(Point::ONE);
        if !window.state.flags.contains(WindowFlags::RESIZABLE) {
            // fixed-size windows pin min and max to the new size
            let mut pinned = X11Window::new(window.state.clone(), window.xid);
            pinned.state.dimensions = size;
            self.write_size_hints(&pinned);
        }
        checked(
            self.ctx.conn.configure_window(
                window.xid,
                &ConfigureWindowAux::new().width(size.x as u32).height(size.y as u32),
            ),
            "resize",
        );
        self.ctx.flush();
    }

    fn set_position(&mut self, id: WindowId, pos: Point) {
        let Some(xid) = self.xid(id) else { return };
        checked(
            self.ctx.conn.configure_window(xid, &ConfigureWindowAux::new().x(pos.x).y(pos.y)),
            "move",
        );
        self.ctx.flush();
    }

    fn set_resize_limit(&mut self, id: WindowId, limit: Point) {
        let Some(window) = self.windows.get_mut(&id) else { return };
        window.state.resize_limit = limit.max(Point::ZERO);
        let size = window.state.dimensions;
        let Some(window) = self.windows.get(&id) else { return };
        self.write_size_hints(window);
        if size.cmplt(limit).any() {
            self.set_size(id, size);
        }
        self.ctx.flush();
    }

    fn show(&mut self, id: WindowId) {
        let Some(xid) = self.xid(id) else { return };
        // HIDDEN clears on MapNotify
        checked(self.ctx.conn.map_window(xid), "map");
        self.ctx.flush();
    }

    fn hide(&mut self, id: WindowId) {
        let Some(xid) = self.xid(id) else { return };
        checked(self.ctx.conn.unmap_window(xid), "unmap");
        self.ctx.flush();
    }

    fn focus(&mut self, id: WindowId) {
        let Some(xid) = self.xid(id) else { return };
        // source indication 1: a normal application
        self.ctx
            .send_to_root(xid, self.ctx.atoms._NET_ACTIVE_WINDOW, [1, CURRENT_TIME, 0, 0, 0]);
        checked(self.ctx.conn.set_input_focus(InputFocus::PARENT, xid, CURRENT_TIME), "focus");
        self.ctx.flush();
    }

    fn set_fullscreen(&mut self, id: WindowId, enabled: bool) {
        let Some(window) = self.window(id) else { return };
        if window.state.is_fullscreen() == enabled {
            return;
        }
        self.set_wm_state(window.xid, enabled, self.ctx.atoms._NET_WM_STATE_FULLSCREEN, 0);
    }

    fn minimize(&mut self, id: WindowId) {
        let Some(xid) = self.xid(id) else { return };
        self.ctx
            .send_to_root(xid, self.ctx.atoms.WM_CHANGE_STATE, [ICONIC_STATE, 0, 0, 0, 0]);
        self.ctx.flush();
    }

    fn maximize(&mut self, id: WindowId) {
        let Some(xid) = self.xid(id) else { return };
        let atoms = &self.ctx.atoms;
        let (vert, horz) = (atoms._NET_WM_STATE_MAXIMIZED_VERT, atoms._NET_WM_STATE_MAXIMIZED_HORZ);
        self.set_wm_state(xid, true, vert, horz);
    }

    fn restore(&mut self, id: WindowId) {
        let Some(window) = self.window(id) else { return };
        let (xid, state) = (window.xid, window.state.clone());
        let atoms = &self.ctx.atoms;
        if state.is_minimized() {
            checked(self.ctx.conn.map_window(xid), "map");
            self.ctx
                .send_to_root(xid, atoms._NET_ACTIVE_WINDOW, [1, CURRENT_TIME, 0, 0, 0]);
        } else if state.is_fullscreen() {
            self.set_wm_state(xid, false, atoms._NET_WM_STATE_FULLSCREEN, 0);
        } else if state.is_maximized() {
            let vert = atoms._NET_WM_STATE_MAXIMIZED_VERT;
            let horz = atoms._NET_WM_STATE_MAXIMIZED_HORZ;
            self.set_wm_state(xid, false, vert, horz);
        }
        self.ctx.flush();
    }

    fn set_decorated(&mut self, id: WindowId, decorated: bool) {
        let Some(window) = self.windows.get_mut(&id) else { return };
        window.state.flags.set(WindowFlags::DECORATED, decorated);
        let xid = window.xid;
        self.write_motif_hints(xid, decorated);
        self.ctx.flush();
    }

    fn request_close(&mut self, id: WindowId) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.state.notify_close_request();
        }
    }

    fn set_cursor_position(&mut self, id: WindowId, pos: PointF) {
        let Some(window) = self.windows.get_mut(&id) else { return };
        // the resulting MotionNotify would echo the warp back
        window.state.cursor_pos = pos;
        let xid = window.xid;
        checked(
            self.ctx
                .conn
                .warp_pointer(x11rb::NONE, xid, 0, 0, 0, 0, pos.x as i16, pos.y as i16),
            "warp",
        );
        self.ctx.flush();
    }

    fn create_cursor(&mut self, source: CursorSource) -> Result<Cursor> {
        let handle = match &source {
            CursorSource::Standard(shape) => self.cursors.standard(&self.ctx, *shape),
            CursorSource::Image(image) => {
                let handle = self.cursors.image(&self.ctx, image);
                if let Some(handle) = handle {
                    self.owned_cursors.insert(handle);
                }
                handle
            }
        };
        let handle = handle.ok_or(PlatformError::Unsupported("cursor"))?;
        Ok(Cursor::from_native(source, u64::from(handle)))
    }

    fn destroy_cursor(&mut self, cursor: &Cursor) {
        let handle = cursor.handle() as u32;
        self.owned_cursors.remove(&handle);
        self.cursors.free(&self.ctx, handle);
        self.ctx.flush();
    }

    fn set_cursor(&mut self, id: WindowId, cursor: &Rc<Cursor>) {
        let Some(window) = self.windows.get_mut(&id) else { return };
        window.state.cursor = Rc::downgrade(cursor);
        if let Some(window) = self.windows.get(&id) {
            self.apply_cursor(window);
        }
    }

    fn set_cursor_hidden(&mut self, id: WindowId, hidden: bool) {
        let Some(window) = self.windows.get_mut(&id) else { return };
        window.state.cursor_hidden = hidden;
        if let Some(window) = self.windows.get(&id) {
            self.apply_cursor(window);
        }
    }

    fn set_clipboard_string(&mut self, id: WindowId, text: &str) {
        if self.window(id).is_none() {
            return;
        }
        self.owner.set_text(text);
        let clipboard = self.ctx.atoms.CLIPBOARD;
        checked(
            self.ctx.conn.set_selection_owner(self.ctx.helper, clipboard, CURRENT_TIME),
            "set selection owner",
        );
        if !self.owns_clipboard() {
            warn!("failed to become the clipboard owner");
        }
    }

    fn clipboard_string(&mut self, id: WindowId) -> String {
        let Some(xid) = self.xid(id) else {
            return String::new();
        };
        if self.owns_clipboard() {
            if let Some(text) = self.owner.text() {
                return text.to_owned();
            }
        }
        let targets = [self.ctx.atoms.UTF8_STRING, u32::from(AtomEnum::STRING)];
        for target in targets {
            if let Some(text) = self.receive_clipboard(xid, target) {
                return text;
            }
        }
        debug!("clipboard empty or unreadable");
        String::new()
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        monitor::enumerate(&self.ctx)
    }

    fn shutdown(&mut self) {
        self.hand_off_clipboard();
        let ids: Vec<WindowId> = self.windows.keys().copied().collect();
        for id in ids {
            if let Err(err) = self.destroy_window(id) {
                warn!(window = ?id, "failed to destroy window on shutdown: {err}");
            }
        }
        for handle in self.owned_cursors.drain() {
            self.cursors.free(&self.ctx, handle);
        }
        self.cursors.release(&self.ctx);
        self.ctx.flush();
        info!("x11 backend shut down");
    }
}
