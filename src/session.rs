//! Clipboard session state: ownership, contents caching, flavor listeners
//! and the single-slot conversion handoff to the clipboard owner's context.
//!
//! All owner and listener notifications are delivered asynchronously on a
//! dedicated notification thread, never on the caller's stack.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::charset::Direction;
use crate::error::{TransferError, TransferResult};
use crate::flavor::{DataFlavor, Transferable};
use crate::mapping::MappingEngine;
use crate::ranking::FlavorOrder;
use crate::registry::{FlavorTable, FormatId};

/// Identifies the application context that placed contents on a clipboard.
pub type ContextId = u64;

/// Handle for removing a flavor listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Receives the notification that clipboard ownership moved elsewhere.
pub trait ClipboardOwner: Send + Sync {
    /// Called once, asynchronously, when this owner's contents are replaced.
    fn lost_ownership(&self);
}

/// Observes changes to the set of flavors available on the clipboard.
pub trait FlavorListener: Send + Sync {
    /// Called asynchronously after the available flavor set changed.
    fn flavors_changed(&self);
}

/// Platform clipboard primitives the session drives.
pub trait ClipboardIo: Send {
    /// Opens the clipboard for a batch of operations.
    fn open(&self) -> TransferResult<()>;

    /// Closes the clipboard.
    fn close(&self);

    /// Native formats currently on the clipboard, most preferred first.
    fn available_formats(&self) -> TransferResult<Vec<FormatId>>;

    /// Reads the raw bytes of one native format.
    fn read_bytes(&self, format: FormatId) -> TransferResult<Vec<u8>>;

    /// Publishes a source's contents to the platform clipboard.
    fn write_contents(&self, contents: &dyn Transferable) -> TransferResult<()>;
}

// =============================================================================
// Notification queue
// =============================================================================

type Task = Box<dyn FnOnce() + Send>;

// Dedicated thread running owner and listener callbacks in posting order.
struct NotificationQueue {
    tx: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
}

impl NotificationQueue {
    fn new() -> Self {
        let (tx, rx) = unbounded::<Task>();
        let worker = std::thread::Builder::new()
            .name("clipboard-notify".into())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    task();
                }
            })
            .ok();
        if worker.is_none() {
            warn!("notification thread unavailable, callbacks will be dropped");
        }
        Self {
            tx: worker.is_some().then_some(tx),
            worker,
        }
    }

    fn post(&self, task: Task) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(task);
        }
    }
}

impl Drop for NotificationQueue {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// =============================================================================
// Conversion handoff
// =============================================================================

/// Hands a conversion task to the clipboard owner's context and waits for
/// the produced bytes.
///
/// At most one conversion is outstanding at a time; a second request blocks
/// until the first completes. The dispatcher runs the boxed task on the
/// owner's context (its event loop, a worker thread) and the result comes
/// back over a one-shot channel.
pub struct ConversionHandoff {
    slot: Mutex<()>,
}

impl ConversionHandoff {
    /// Creates an idle handoff.
    pub fn new() -> Self {
        Self { slot: Mutex::new(()) }
    }

    /// Runs `convert` on the owner's context via `dispatch`, blocking until
    /// the bytes (or the failure) come back.
    ///
    /// If the owner's context drops the task without running it, the wait
    /// ends with [`TransferError::ClipboardUnavailable`].
    pub fn submit<D, F>(&self, dispatch: D, convert: F) -> TransferResult<Vec<u8>>
    where
        D: FnOnce(Box<dyn FnOnce() + Send>),
        F: FnOnce() -> TransferResult<Vec<u8>> + Send + 'static,
    {
        let _pending = self.slot.lock();
        let (tx, rx) = bounded(1);
        dispatch(Box::new(move || {
            let _ = tx.send(convert());
        }));
        match rx.recv() {
            Ok(result) => result,
            Err(_) => Err(TransferError::ClipboardUnavailable(
                "conversion context terminated".into(),
            )),
        }
    }
}

impl Default for ConversionHandoff {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Clipboard session
// =============================================================================

struct SessionState {
    contents: Option<Arc<dyn Transferable + Send + Sync>>,
    owner: Option<Arc<dyn ClipboardOwner>>,
    owner_context: Option<ContextId>,
    observed_formats: Option<BTreeSet<FormatId>>,
    listeners: Vec<(ListenerId, Arc<dyn FlavorListener>)>,
    next_listener: u64,
}

/// A clipboard: local contents and ownership plus the platform formats view.
pub struct Clipboard<C: ClipboardIo> {
    name: String,
    io: C,
    state: Mutex<SessionState>,
    notifier: NotificationQueue,
    handoff: ConversionHandoff,
}

impl<C: ClipboardIo> Clipboard<C> {
    /// Creates a clipboard over the given platform primitives.
    pub fn new(name: impl Into<String>, io: C) -> Self {
        Self {
            name: name.into(),
            io,
            state: Mutex::new(SessionState {
                contents: None,
                owner: None,
                owner_context: None,
                observed_formats: None,
                listeners: Vec::new(),
                next_listener: 0,
            }),
            notifier: NotificationQueue::new(),
            handoff: ConversionHandoff::new(),
        }
    }

    /// The clipboard's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The platform primitives.
    pub fn io(&self) -> &C {
        &self.io
    }

    /// The conversion handoff for this clipboard.
    pub fn handoff(&self) -> &ConversionHandoff {
        &self.handoff
    }

    /// Publishes new contents and takes ownership for `context`.
    ///
    /// The previous owner, if any and different, is notified asynchronously
    /// that it lost ownership.
    pub fn set_contents(
        &self,
        contents: Arc<dyn Transferable + Send + Sync>,
        owner: Option<Arc<dyn ClipboardOwner>>,
        context: ContextId,
    ) -> TransferResult<()> {
        self.io.open()?;
        let write_result = self.io.write_contents(contents.as_ref());
        self.io.close();
        write_result?;

        let previous = {
            let mut state = self.state.lock();
            let previous = state.owner.take();
            state.contents = Some(contents);
            state.owner = owner.clone();
            state.owner_context = Some(context);
            previous
        };

        if let Some(previous) = previous {
            let same = owner
                .as_ref()
                .is_some_and(|new| Arc::ptr_eq(new, &previous));
            if !same {
                debug!(clipboard = %self.name, "scheduling lost-ownership notification");
                self.notifier.post(Box::new(move || previous.lost_ownership()));
            }
        }
        Ok(())
    }

    /// The locally cached contents, if `context` is the current owner.
    ///
    /// Other contexts must go through the platform formats instead.
    pub fn local_contents(
        &self,
        context: ContextId,
    ) -> Option<Arc<dyn Transferable + Send + Sync>> {
        let state = self.state.lock();
        if state.owner_context == Some(context) {
            state.contents.clone()
        } else {
            None
        }
    }

    /// Reacts to the platform reporting that another application took the
    /// clipboard. Clears local state and notifies the old owner exactly
    /// once, even if the platform signals more than once.
    pub fn ownership_lost(&self) {
        let previous = {
            let mut state = self.state.lock();
            state.contents = None;
            state.owner_context = None;
            state.owner.take()
        };
        if let Some(previous) = previous {
            self.notifier.post(Box::new(move || previous.lost_ownership()));
        }
    }

    /// Native formats currently available, via an open/close bracket.
    pub fn available_formats(&self) -> TransferResult<Vec<FormatId>> {
        self.io.open()?;
        let formats = self.io.available_formats();
        self.io.close();
        formats
    }

    /// Raw bytes of one native format, via an open/close bracket.
    pub fn read_format_bytes(&self, format: FormatId) -> TransferResult<Vec<u8>> {
        self.io.open()?;
        let bytes = self.io.read_bytes(format);
        self.io.close();
        bytes
    }

    /// Flavors currently requestable from this clipboard, best first.
    pub fn available_flavors(
        &self,
        engine: &MappingEngine<'_>,
        table: &dyn FlavorTable,
    ) -> TransferResult<Vec<DataFlavor>> {
        let formats = self.available_formats()?;
        Ok(engine.flavors_for_formats_sorted(&formats, table))
    }

    /// Whether a specific flavor is currently requestable.
    pub fn is_flavor_available(
        &self,
        flavor: &DataFlavor,
        engine: &MappingEngine<'_>,
        table: &dyn FlavorTable,
    ) -> TransferResult<bool> {
        let formats = self.available_formats()?;
        Ok(engine
            .flavors_for_formats_as_set(&formats, table)
            .contains(flavor))
    }

    // -------------------------------------------------------------------------
    // Flavor listeners
    // -------------------------------------------------------------------------

    /// Registers a listener for flavor-set changes.
    pub fn add_flavor_listener(&self, listener: Arc<dyn FlavorListener>) -> ListenerId {
        let mut state = self.state.lock();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, listener));
        id
    }

    /// Removes a listener; unknown ids are ignored.
    pub fn remove_flavor_listener(&self, id: ListenerId) {
        self.state.lock().listeners.retain(|(lid, _)| *lid != id);
    }

    /// Whether any flavor listeners are registered. Platform layers use
    /// this to decide whether watching the clipboard is worth the cost.
    pub fn has_flavor_listeners(&self) -> bool {
        !self.state.lock().listeners.is_empty()
    }

    /// Feeds a platform formats report into change detection.
    ///
    /// Listeners fire only when the format set actually differs from the
    /// last observed one; repeated identical reports are suppressed.
    pub fn check_change(&self, formats: &[FormatId]) {
        let incoming: BTreeSet<FormatId> = formats.iter().copied().collect();
        let to_notify: Vec<Arc<dyn FlavorListener>> = {
            let mut state = self.state.lock();
            if state.observed_formats.as_ref() == Some(&incoming) {
                return;
            }
            state.observed_formats = Some(incoming);
            state.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        debug!(clipboard = %self.name, listeners = to_notify.len(), "flavor set changed");
        for listener in to_notify {
            self.notifier.post(Box::new(move || listener.flavors_changed()));
        }
    }
}

// Best-first sort is re-exported here for platform layers that fetch flavor
// sets without a mapping engine.
/// Sorts a flavor list in place, best first.
pub fn sort_flavors_best_first(flavors: &mut [DataFlavor]) {
    let order = FlavorOrder::new(Direction::BestFirst);
    flavors.sort_by(|a, b| order.compare(a, b));
}
