use crate::models::chat::{ Conversation, Message };
use log::debug;
use std::sync::{ Arc, Mutex, Weak };

type Handler<T> = Box<dyn FnMut(&T) + Send>;

struct Subscribers<T> {
    handlers: Vec<(u64, Handler<T>)>,
    next_id: u64,
}

struct Inner<T> {
    value: Mutex<T>,
    subscribers: Mutex<Subscribers<T>>,
}

/// A single observable state cell: read the current value, replace or
/// transform it, and subscribe to every subsequent value.
///
/// Delivery is synchronous and in-order: `set`/`update` invoke all
/// current handlers with the new value before returning. Handlers run
/// under the subscriber-list lock, so a handler must not call back into
/// the same cell.
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(initial),
                subscribers: Mutex::new(Subscribers {
                    handlers: Vec::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.inner.value.lock().unwrap().clone()
    }

    /// Replace the value and notify all subscribers before returning.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.lock().unwrap();
            *guard = value.clone();
        }
        self.notify(&value);
    }

    /// Transform the value via a pure function of the previous value,
    /// then notify all subscribers before returning.
    pub fn update<F>(&self, f: F) where F: FnOnce(&T) -> T {
        let next = {
            let mut guard = self.inner.value.lock().unwrap();
            let next = f(&*guard);
            *guard = next.clone();
            next
        };
        self.notify(&next);
    }

    /// Register `handler` to receive every value set after this call.
    /// Delivery continues until the returned token is used to
    /// unsubscribe; dropping the token does not end the subscription.
    pub fn subscribe<F>(&self, handler: F) -> Subscription<T> where F: FnMut(&T) + Send + 'static {
        let mut subs = self.inner.subscribers.lock().unwrap();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.handlers.push((id, Box::new(handler)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    fn notify(&self, value: &T) {
        let mut subs = self.inner.subscribers.lock().unwrap();
        for (_, handler) in subs.handlers.iter_mut() {
            handler(value);
        }
    }
}

/// Token returned by [`Observable::subscribe`].
pub struct Subscription<T> {
    inner: Weak<Inner<T>>,
    id: u64,
}

impl<T> Subscription<T> {
    /// Stop delivery to the handler this token was issued for.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut subs = inner.subscribers.lock().unwrap();
            subs.handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// The client-side chat state: three independently observable cells
/// plus the two mutation helpers that fold messages into the active
/// conversation.
///
/// `conversations` is declared here but never mutated by this crate;
/// populating it is the surrounding application's job. Callers are
/// expected to mutate `current_conversation` only through the helpers.
pub struct ConversationStore {
    pub current_conversation: Observable<Option<Conversation>>,
    pub conversations: Observable<Vec<Conversation>>,
    pub is_loading: Observable<bool>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            current_conversation: Observable::new(None),
            conversations: Observable::new(Vec::new()),
            is_loading: Observable::new(false),
        }
    }

    /// Replace the active conversation wholesale with a fresh one:
    /// client-generated id, empty history, `created_at == updated_at`.
    pub fn create_new_conversation(&self) {
        let conv = Conversation::new();
        debug!("Starting new conversation {}", conv.id);
        self.current_conversation.set(Some(conv));
    }

    /// Append `message` to the active conversation and refresh its
    /// `updated_at`. A no-op when no conversation is active.
    pub fn add_message_to_conversation(&self, message: Message) {
        self.current_conversation.update(|conv| {
            match conv {
                None => None,
                Some(current) => Some(current.with_message(message)),
            }
        });
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
