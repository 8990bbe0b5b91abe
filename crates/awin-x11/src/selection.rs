//! ICCCM selection transfers as a pure state machine.
//!
//! The owner side answers `SelectionRequest`s for `TARGETS`, `MULTIPLE`,
//! `SAVE_TARGETS`, `UTF8_STRING` and `STRING`, switching to `INCR` for text
//! larger than one request. The receiver side accumulates a reply, including
//! incremental ones, into a string. Neither side talks to the server; they
//! emit [`WireOp`]s that the context executes.

use std::collections::HashMap;

use tracing::{debug, warn};

pub type Atom = u32;
pub type Xid = u32;

pub const NONE: Atom = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionAtoms {
    pub targets: Atom,
    pub multiple: Atom,
    pub utf8_string: Atom,
    pub string: Atom,
    pub save_targets: Atom,
    pub incr: Atom,
    pub atom: Atom,
    pub atom_pair: Atom,
    pub null: Atom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyData {
    /// Format 8.
    Bytes(Vec<u8>),
    /// Format 32.
    Atoms(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireOp {
    ChangeProperty {
        window: Xid,
        property: Atom,
        type_: Atom,
        data: PropertyData,
    },
    /// Start or stop receiving `PropertyNotify` from a requestor.
    WatchProperties { window: Xid, enable: bool },
    /// `SelectionNotify` to the requestor; `property == NONE` refuses.
    Notify {
        requestor: Xid,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRequest {
    pub requestor: Xid,
    pub selection: Atom,
    pub target: Atom,
    pub property: Atom,
    pub time: u32,
}

struct OutgoingTransfer {
    type_: Atom,
    data: Vec<u8>,
    offset: usize,
}

/// What this client offers while it owns a selection.
pub struct SelectionOwner {
    text: Option<String>,
    chunk_size: usize,
    outgoing: HashMap<(Xid, Atom), OutgoingTransfer>,
}

fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')).collect()
}

impl SelectionOwner {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            text: None,
            chunk_size: chunk_size.max(1),
            outgoing: HashMap::new(),
        }
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = Some(text.to_owned());
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Ownership passed to another client. Transfers already under way keep
    /// their snapshot of the data.
    pub fn clear(&mut self) {
        self.text = None;
    }

    pub fn has_pending_transfers(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// `multiple` holds the requestor's `ATOM_PAIR` list when the target is
    /// `MULTIPLE`.
    pub fn answer(
        &mut self,
        atoms: &SelectionAtoms,
        request: &SelectionRequest,
        multiple: Option<&[Atom]>,
    ) -> Vec<WireOp> {
        // obsolete clients leave the property unset
        let property = if request.property == NONE {
            request.target
        } else {
            request.property
        };
        let mut ops = Vec::new();
        let converted = if self.text.is_none() {
            false
        } else if request.target == atoms.multiple {
            match multiple {
                Some(pairs) if request.property != NONE => {
                    self.convert_multiple(atoms, request.requestor, property, pairs, &mut ops);
                    true
                }
                _ => false,
            }
        } else if request.target == atoms.save_targets {
            ops.push(WireOp::ChangeProperty {
                window: request.requestor,
                property,
                type_: atoms.null,
                data: PropertyData::Atoms(Vec::new()),
            });
            true
        } else {
            self.convert(atoms, request.requestor, request.target, property, &mut ops)
        };

        if !converted {
            debug!(target = request.target, "refusing selection request");
        }
        ops.push(WireOp::Notify {
            requestor: request.requestor,
            selection: request.selection,
            target: request.target,
            property: if converted { property } else { NONE },
            time: request.time,
        });
        ops
    }

    fn convert_multiple(
        &mut self,
        atoms: &SelectionAtoms,
        requestor: Xid,
        property: Atom,
        pairs: &[Atom],
        ops: &mut Vec<WireOp>,
    ) {
        let mut answered = pairs.to_vec();
        for pair in answered.chunks_exact_mut(2) {
            let (target, target_property) = (pair[0], pair[1]);
            let converted = target_property != NONE
                && self.convert(atoms, requestor, target, target_property, ops);
            if !converted {
                pair[1] = NONE;
            }
        }
        ops.push(WireOp::ChangeProperty {
            window: requestor,
            property,
            type_: atoms.atom_pair,
            data: PropertyData::Atoms(answered),
        });
    }

    fn convert(
        &mut self,
        atoms: &SelectionAtoms,
        requestor: Xid,
        target: Atom,
        property: Atom,
        ops: &mut Vec<WireOp>,
    ) -> bool {
        if target == atoms.targets {
            ops.push(WireOp::ChangeProperty {
                window: requestor,
                property,
                type_: atoms.atom,
                data: PropertyData::Atoms(vec![
                    atoms.targets,
                    atoms.multiple,
                    atoms.utf8_string,
                    atoms.string,
                ]),
            });
            return true;
        }

        let Some(text) = self.text.as_deref() else {
            return false;
        };
        let data = if target == atoms.utf8_string {
            text.as_bytes().to_vec()
        } else if target == atoms.string {
            latin1(text)
        } else {
            return false;
        };

        if data.len() <= self.chunk_size {
            ops.push(WireOp::ChangeProperty {
                window: requestor,
                property,
                type_: target,
                data: PropertyData::Bytes(data),
            });
            return true;
        }

        debug!(bytes = data.len(), requestor, "starting incremental transfer");
        ops.push(WireOp::WatchProperties { window: requestor, enable: true });
        ops.push(WireOp::ChangeProperty {
            window: requestor,
            property,
            type_: atoms.incr,
            data: PropertyData::Atoms(vec![u32::try_from(data.len()).unwrap_or(u32::MAX)]),
        });
        self.outgoing.insert(
            (requestor, property),
            OutgoingTransfer {
                type_: target,
                data,
                offset: 0,
            },
        );
        true
    }

    /// The requestor deleted `property`, asking for the next chunk of an
    /// incremental transfer.
    pub fn on_property_deleted(&mut self, window: Xid, property: Atom) -> Vec<WireOp> {
        let Some(transfer) = self.outgoing.get_mut(&(window, property)) else {
            return Vec::new();
        };
        let end = (transfer.offset + self.chunk_size).min(transfer.data.len());
        let chunk = transfer.data[transfer.offset..end].to_vec();
        let type_ = transfer.type_;
        transfer.offset = end;

        let mut ops = Vec::new();
        let finished = chunk.is_empty();
        ops.push(WireOp::ChangeProperty {
            window,
            property,
            type_,
            data: PropertyData::Bytes(chunk),
        });
        if finished {
            self.outgoing.remove(&(window, property));
            if !self.outgoing.keys().any(|(w, _)| *w == window) {
                ops.push(WireOp::WatchProperties { window, enable: false });
            }
        }
        ops
    }

    /// The requestor went away mid-transfer.
    pub fn forget_requestor(&mut self, window: Xid) {
        self.outgoing.retain(|(w, _), _| *w != window);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receive {
    Pending,
    Done(String),
    Failed,
}

/// A conversion this client asked for.
pub struct IncomingTransfer {
    type_: Atom,
    incremental: bool,
    buffer: Vec<u8>,
}

impl IncomingTransfer {
    pub fn new() -> Self {
        Self {
            type_: NONE,
            incremental: false,
            buffer: Vec::new(),
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    /// Contents of the property named by `SelectionNotify`, read with delete.
    pub fn on_notify(&mut self, atoms: &SelectionAtoms, type_: Atom, data: Vec<u8>) -> Receive {
        if type_ == atoms.incr {
            self.incremental = true;
            return Receive::Pending;
        }
        if type_ == NONE {
            return Receive::Failed;
        }
        if type_ != atoms.utf8_string && type_ != atoms.string {
            warn!(type_, "selection reply has an unexpected type");
            return Receive::Failed;
        }
        Receive::Done(decode(atoms, type_, &data))
    }

    /// One chunk of an incremental transfer, read with delete.
    pub fn on_chunk(&mut self, atoms: &SelectionAtoms, type_: Atom, data: Vec<u8>) -> Receive {
        if !self.incremental {
            return Receive::Pending;
        }
        if data.is_empty() {
            return Receive::Done(decode(atoms, self.type_, &self.buffer));
        }
        if self.type_ == NONE {
            self.type_ = type_;
        }
        self.buffer.extend_from_slice(&data);
        Receive::Pending
    }
}

impl Default for IncomingTransfer {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(atoms: &SelectionAtoms, type_: Atom, data: &[u8]) -> String {
    if type_ == atoms.string {
        data.iter().map(|b| char::from(*b)).collect()
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}
