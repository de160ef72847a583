//! Listener tables and their bookkeeping.
//!
//! Entries are keyed by a stable [`ListenerId`]. During dispatch a callback is
//! taken out of its slot, run without the registry lock held, and put back
//! afterwards, so callbacks may register and remove listeners freely.

use framelink_frame::{ListenerKind, Message, Userdata};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// What a listener callback did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Not handled here; try the next listener.
    Next,
    /// Handled; keep the listener.
    Stay,
    /// Handled; keep the listener and restart its timeout.
    Renew,
    /// Handled; remove the listener.
    Close,
}

/// Stable handle to a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Message callback shared by all three tiers.
pub type Callback = Box<dyn FnMut(&Engine, &mut Message) -> Directive + Send>;

/// Invoked once when an ID listener expires.
pub type TimeoutCallback = Box<dyn FnOnce(&Engine) + Send>;

/// Response listener registered for a single frame ID.
pub struct IdListener {
    callback: Callback,
    on_timeout: Option<TimeoutCallback>,
    timeout_ticks: u32,
    userdata: Userdata,
    userdata2: Userdata,
}

impl IdListener {
    /// A listener that never expires.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&Engine, &mut Message) -> Directive + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
            on_timeout: None,
            timeout_ticks: 0,
            userdata: None,
            userdata2: None,
        }
    }

    /// Expire after `ticks` ticks without a renewing response. `0` never expires.
    pub fn timeout(mut self, ticks: u32) -> Self {
        self.timeout_ticks = ticks;
        self
    }

    /// Run `on_timeout` when the listener expires.
    pub fn on_timeout<F>(mut self, on_timeout: F) -> Self
    where
        F: FnOnce(&Engine) + Send + 'static,
    {
        self.on_timeout = Some(Box::new(on_timeout));
        self
    }

    /// Seed the userdata slots handed to the callback.
    pub fn userdata(mut self, userdata: Userdata, userdata2: Userdata) -> Self {
        self.userdata = userdata;
        self.userdata2 = userdata2;
        self
    }

    pub(crate) fn adopt_userdata(&mut self, msg: &mut Message) {
        if msg.userdata.is_some() {
            self.userdata = msg.userdata.take();
        }
        if msg.userdata2.is_some() {
            self.userdata2 = msg.userdata2.take();
        }
    }
}

struct Entry {
    key: ListenerId,
    /// Frame ID or message type. Unused for generic listeners.
    selector: u32,
    /// `None` while the callback is running.
    callback: Option<Callback>,
    on_timeout: Option<TimeoutCallback>,
    timeout: u32,
    timeout_max: u32,
    userdata: Userdata,
    userdata2: Userdata,
}

impl Entry {
    fn new(key: ListenerId, selector: u32, callback: Callback) -> Self {
        Self {
            key,
            selector,
            callback: Some(callback),
            on_timeout: None,
            timeout: 0,
            timeout_max: 0,
            userdata: None,
            userdata2: None,
        }
    }
}

/// An ID listener removed by the tick clock.
pub(crate) struct Expired {
    pub frame_id: u32,
    pub on_timeout: Option<TimeoutCallback>,
}

/// The three bounded listener tables.
pub(crate) struct Registry {
    ids: Vec<Entry>,
    types: Vec<Entry>,
    generics: Vec<Entry>,
    max_ids: usize,
    max_types: usize,
    max_generics: usize,
    next_key: u64,
}

impl Registry {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ids: Vec::with_capacity(config.max_id_listeners),
            types: Vec::with_capacity(config.max_type_listeners),
            generics: Vec::with_capacity(config.max_generic_listeners),
            max_ids: config.max_id_listeners,
            max_types: config.max_type_listeners,
            max_generics: config.max_generic_listeners,
            next_key: 0,
        }
    }

    pub fn add_id(&mut self, frame_id: u32, listener: IdListener) -> Result<ListenerId> {
        if self.has_id(frame_id) {
            return Err(EngineError::IdListenerExists(frame_id));
        }
        self.ensure_room(ListenerKind::Id)?;

        let key = self.next_key();
        let mut entry = Entry::new(key, frame_id, listener.callback);
        entry.on_timeout = listener.on_timeout;
        entry.timeout = listener.timeout_ticks;
        entry.timeout_max = listener.timeout_ticks;
        entry.userdata = listener.userdata;
        entry.userdata2 = listener.userdata2;
        self.ids.push(entry);
        Ok(key)
    }

    pub fn add_type(&mut self, msg_type: u32, callback: Callback) -> Result<ListenerId> {
        self.ensure_room(ListenerKind::Type)?;
        let key = self.next_key();
        self.types.push(Entry::new(key, msg_type, callback));
        Ok(key)
    }

    pub fn add_generic(&mut self, callback: Callback) -> Result<ListenerId> {
        self.ensure_room(ListenerKind::Generic)?;
        let key = self.next_key();
        self.generics.push(Entry::new(key, 0, callback));
        Ok(key)
    }

    pub fn has_id(&self, frame_id: u32) -> bool {
        self.ids.iter().any(|e| e.selector == frame_id)
    }

    pub fn remove_id(&mut self, frame_id: u32) -> bool {
        remove_where(&mut self.ids, |e| e.selector == frame_id)
    }

    /// Removes every type listener bound to `msg_type`.
    pub fn remove_type(&mut self, msg_type: u32) -> bool {
        remove_where(&mut self.types, |e| e.selector == msg_type)
    }

    pub fn remove(&mut self, kind: ListenerKind, key: ListenerId) -> bool {
        remove_where(self.table_mut(kind), |e| e.key == key)
    }

    pub fn renew_id(&mut self, frame_id: u32) -> bool {
        match self.ids.iter_mut().find(|e| e.selector == frame_id) {
            Some(entry) => {
                entry.timeout = entry.timeout_max;
                true
            }
            None => false,
        }
    }

    pub fn len(&self, kind: ListenerKind) -> usize {
        self.table(kind).len()
    }

    /// Keys of the listeners in `kind` that match `selector`, in registration
    /// order.
    pub fn matching(&self, kind: ListenerKind, selector: u32) -> Vec<ListenerId> {
        self.table(kind)
            .iter()
            .filter(|e| kind == ListenerKind::Generic || e.selector == selector)
            .map(|e| e.key)
            .collect()
    }

    /// Take a listener's callback for the duration of a dispatch. ID
    /// listeners also lend their userdata to `msg`.
    pub fn take(
        &mut self,
        kind: ListenerKind,
        key: ListenerId,
        msg: &mut Message,
    ) -> Option<Callback> {
        let entry = self.table_mut(kind).iter_mut().find(|e| e.key == key)?;
        let callback = entry.callback.take()?;
        if kind == ListenerKind::Id {
            msg.userdata = entry.userdata.take();
            msg.userdata2 = entry.userdata2.take();
        }
        Some(callback)
    }

    /// Return a callback after dispatch and apply its directive. If the
    /// listener was removed meanwhile, the callback is dropped.
    pub fn restore(
        &mut self,
        kind: ListenerKind,
        key: ListenerId,
        callback: Callback,
        msg: &mut Message,
        directive: Directive,
    ) {
        let table = self.table_mut(kind);
        let Some(pos) = table.iter().position(|e| e.key == key) else {
            return;
        };

        if kind == ListenerKind::Id {
            let entry = &mut table[pos];
            entry.userdata = msg.userdata.take();
            entry.userdata2 = msg.userdata2.take();
        }

        match directive {
            Directive::Close => {
                table.remove(pos);
            }
            Directive::Renew => {
                let entry = &mut table[pos];
                entry.timeout = entry.timeout_max;
                entry.callback = Some(callback);
            }
            Directive::Next | Directive::Stay => {
                table[pos].callback = Some(callback);
            }
        }
    }

    /// Count down every ID listener with a timeout and remove the expired ones.
    pub fn tick(&mut self) -> Vec<Expired> {
        let mut expired = Vec::new();
        self.ids.retain_mut(|entry| {
            if entry.timeout == 0 {
                return true;
            }
            entry.timeout -= 1;
            if entry.timeout > 0 {
                return true;
            }
            expired.push(Expired {
                frame_id: entry.selector,
                on_timeout: entry.on_timeout.take(),
            });
            false
        });
        expired
    }

    fn ensure_room(&self, kind: ListenerKind) -> Result<()> {
        let capacity = match kind {
            ListenerKind::Id => self.max_ids,
            ListenerKind::Type => self.max_types,
            ListenerKind::Generic => self.max_generics,
        };
        if self.len(kind) >= capacity {
            return Err(EngineError::ListenerTableFull { kind, capacity });
        }
        Ok(())
    }

    fn next_key(&mut self) -> ListenerId {
        self.next_key += 1;
        ListenerId(self.next_key)
    }

    fn table(&self, kind: ListenerKind) -> &Vec<Entry> {
        match kind {
            ListenerKind::Id => &self.ids,
            ListenerKind::Type => &self.types,
            ListenerKind::Generic => &self.generics,
        }
    }

    fn table_mut(&mut self, kind: ListenerKind) -> &mut Vec<Entry> {
        match kind {
            ListenerKind::Id => &mut self.ids,
            ListenerKind::Type => &mut self.types,
            ListenerKind::Generic => &mut self.generics,
        }
    }
}

fn remove_where(table: &mut Vec<Entry>, pred: impl Fn(&Entry) -> bool) -> bool {
    let before = table.len();
    table.retain(|e| !pred(e));
    table.len() != before
}
