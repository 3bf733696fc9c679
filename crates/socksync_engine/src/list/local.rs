use super::PageCursor;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::group::{Dispatcher, Group, LocalCore, LocalGroup, SyncValue};
use crate::socket::{Socket, SocketId};
use parking_lot::Mutex;
use serde_json::Value;
use socksync_protocol::{
    Args, Envelope, GroupId, ListDelete, ListGet, ListInsert, ListSet, ListSetAll, ListSetCount,
};
use std::collections::HashMap;
use std::sync::Arc;

struct ListState<T> {
    items: Vec<T>,
    cursors: HashMap<SocketId, PageCursor>,
}

/// A list owned by this side.
///
/// Subscribers pick a page with `get` and then receive:
/// - `set_count` after every insert and delete
/// - page-relative `insert`/`delete`/`set` when the index falls in their page
///
/// A subscriber that never sent `get` only receives `set_count`.
pub struct LocalList<T = Value> {
    core: LocalCore,
    dispatcher: Dispatcher<LocalList<T>>,
    max_page_size: usize,
    state: Mutex<ListState<T>>,
}

impl<T: SyncValue> LocalList<T> {
    /// Creates a list serving pages of at most the default size.
    pub fn new(name: impl Into<String>, items: Vec<T>) -> Arc<Self> {
        Self::with_max_page_size(name, items, EngineConfig::default().max_page_size)
    }

    /// Creates a list serving pages of at most `max_page_size` items.
    pub fn with_max_page_size(
        name: impl Into<String>,
        items: Vec<T>,
        max_page_size: usize,
    ) -> Arc<Self> {
        let core = LocalCore::new(GroupId::list(name));
        let dispatcher = core
            .dispatcher::<Self>()
            .register_receive::<ListGet>(true, |list, args, socket| list.serve_page(args, socket));
        Arc::new(Self {
            core,
            dispatcher,
            max_page_size,
            state: Mutex::new(ListState {
                items,
                cursors: HashMap::new(),
            }),
        })
    }

    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        self.core.id()
    }

    /// Returns the largest page served.
    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns true if the list holds no items.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Returns a copy of the item at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.state.lock().items.get(index).cloned()
    }

    /// Returns a copy of every item.
    pub fn items(&self) -> Vec<T> {
        self.state.lock().items.clone()
    }

    /// Returns the page `socket` last requested.
    pub fn cursor_of(&self, socket: &Socket) -> Option<PageCursor> {
        self.state.lock().cursors.get(&socket.id()).copied()
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    /// Returns the current subscribers.
    pub fn subscribers(&self) -> Vec<Arc<Socket>> {
        self.core.subscribers()
    }

    /// Inserts `value` before `index`. `index == len` appends.
    pub fn insert(&self, index: usize, value: T) -> EngineResult<()> {
        let _order = self.core.sequence();
        let wire = serde_json::to_value(&value).map_err(EngineError::invalid_value)?;
        let (total, cursors) = {
            let mut state = self.state.lock();
            let len = state.items.len();
            if index > len {
                return Err(EngineError::BadIndex { index, len });
            }
            state.items.insert(index, value);
            (state.items.len(), state.cursors.clone())
        };
        self.broadcast_count(total)?;
        self.broadcast_windowed(&cursors, index, |index| ListInsert {
            index,
            value: wire.clone(),
        })
    }

    /// Appends `value`.
    pub fn push(&self, value: T) -> EngineResult<()> {
        let _order = self.core.sequence();
        let len = self.len();
        self.insert(len, value)
    }

    /// Removes and returns the item at `index`.
    pub fn delete(&self, index: usize) -> EngineResult<T> {
        let _order = self.core.sequence();
        let (removed, total, cursors) = {
            let mut state = self.state.lock();
            let len = state.items.len();
            if index >= len {
                return Err(EngineError::BadIndex { index, len });
            }
            let removed = state.items.remove(index);
            (removed, state.items.len(), state.cursors.clone())
        };
        self.broadcast_count(total)?;
        self.broadcast_windowed(&cursors, index, |index| ListDelete { index })?;
        Ok(removed)
    }

    /// Replaces the item at `index`, returning the old one.
    ///
    /// Subscribers whose page holds `index` receive `set`; the rest receive
    /// `set_count`.
    pub fn set(&self, index: usize, value: T) -> EngineResult<T> {
        let _order = self.core.sequence();
        let wire = serde_json::to_value(&value).map_err(EngineError::invalid_value)?;
        let (old, total, cursors) = {
            let mut state = self.state.lock();
            let len = state.items.len();
            let slot = state
                .items
                .get_mut(index)
                .ok_or(EngineError::BadIndex { index, len })?;
            let old = std::mem::replace(slot, value);
            (old, len, state.cursors.clone())
        };

        let id = self.core.id();
        let count = Envelope::from_args(id, &ListSetCount {
            total_item_count: total,
        })?;
        let mut windowed = HashMap::new();
        for (socket, cursor) in &cursors {
            if let Some(index) = cursor.window_index(index) {
                let set = ListSet {
                    index,
                    value: wire.clone(),
                };
                windowed.insert(*socket, Envelope::from_args(id, &set)?);
            }
        }
        self.core.send_func(None, |socket| {
            Some(windowed.get(&socket.id()).unwrap_or(&count).clone())
        });
        Ok(old)
    }

    fn broadcast_count(&self, total: usize) -> EngineResult<()> {
        let count = ListSetCount {
            total_item_count: total,
        };
        self.core
            .send_json(&Envelope::from_args(self.core.id(), &count)?, None);
        Ok(())
    }

    fn broadcast_windowed<A: Args>(
        &self,
        cursors: &HashMap<SocketId, PageCursor>,
        index: usize,
        delta: impl Fn(usize) -> A,
    ) -> EngineResult<()> {
        let mut windowed = HashMap::new();
        for (socket, cursor) in cursors {
            if let Some(index) = cursor.window_index(index) {
                windowed.insert(*socket, Envelope::from_args(self.core.id(), &delta(index))?);
            }
        }
        self.core
            .send_func(None, |socket| windowed.remove(&socket.id()));
        Ok(())
    }

    fn serve_page(&self, args: ListGet, socket: &Arc<Socket>) -> EngineResult<()> {
        let _order = self.core.sequence();
        let cursor = PageCursor::new(args.page, args.page_size.min(self.max_page_size));
        let reply = {
            let mut state = self.state.lock();
            state.cursors.insert(socket.id(), cursor);
            let items = state.items[cursor.range(state.items.len())]
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()
                .map_err(EngineError::invalid_value)?;
            ListSetAll {
                page: cursor.page,
                page_size: cursor.page_size,
                total_item_count: state.items.len(),
                items,
            }
        };
        self.core
            .send_json(&Envelope::from_args(self.core.id(), &reply)?, Some(socket));
        Ok(())
    }
}

impl<T: SyncValue> Group for LocalList<T> {
    fn id(&self) -> &GroupId {
        self.core.id()
    }

    fn handle_func(&self, envelope: &Envelope, socket: &Arc<Socket>) {
        self.dispatcher.handle_func(self, envelope, socket);
    }

    fn sockets(&self) -> Vec<Arc<Socket>> {
        self.core.subscribers()
    }

    fn is_subscribed(&self, socket: &Socket) -> bool {
        self.core.is_subscribed(socket)
    }

    fn remove_subscriber(&self, socket: &Socket) {
        self.drop_subscriber(socket);
    }
}

impl<T: SyncValue> LocalGroup for LocalList<T> {
    fn local(&self) -> &LocalCore {
        &self.core
    }

    fn on_unsubscribed(&self, socket: &Socket) {
        self.state.lock().cursors.remove(&socket.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use socksync_protocol::ErrorCode;

    fn subscriber(list: &Arc<LocalList<i64>>, page: Option<(usize, usize)>) -> (Arc<Socket>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let socket = Socket::new(transport.clone());
        socket.register_group(list.clone()).unwrap();
        socket.receive(r#"{"func":"subscribe","type":"list","name":"l"}"#);
        if let Some((page, page_size)) = page {
            socket.receive(
                &json!({"func": "get", "type": "list", "name": "l", "page": page, "page_size": page_size})
                    .to_string(),
            );
        }
        transport.clear();
        (socket, transport)
    }

    fn funcs(transport: &MemoryTransport) -> Vec<Value> {
        transport
            .json_frames()
            .into_iter()
            .map(|mut frame| {
                let obj = frame.as_object_mut().unwrap();
                obj.remove("type");
                obj.remove("name");
                frame
            })
            .collect()
    }

    #[test]
    fn serves_pages() {
        let list = LocalList::with_max_page_size("l", vec![1i64, 2, 3], 2);
        let (socket, transport) = subscriber(&list, None);

        socket.receive(r#"{"func":"get","type":"list","name":"l","page":0,"page_size":2}"#);
        assert_eq!(
            funcs(&transport),
            vec![json!({"func": "set_all", "page": 0, "page_size": 2, "total_item_count": 3, "items": [1, 2]})]
        );

        transport.clear();
        socket.receive(r#"{"func":"get","type":"list","name":"l","page":1,"page_size":2}"#);
        assert_eq!(funcs(&transport)[0]["items"], json!([3]));
        assert_eq!(list.cursor_of(&socket), Some(PageCursor::new(1, 2)));
    }

    #[test]
    fn page_size_is_clamped() {
        let list = LocalList::with_max_page_size("l", vec![1i64, 2, 3], 2);
        let (socket, transport) = subscriber(&list, None);
        socket.receive(r#"{"func":"get","type":"list","name":"l","page":0,"page_size":50}"#);
        let reply = &funcs(&transport)[0];
        assert_eq!(reply["page_size"], json!(2));
        assert_eq!(reply["items"], json!([1, 2]));
    }

    #[test]
    fn get_needs_paging_fields() {
        let list = LocalList::new("l", vec![1i64]);
        let (socket, transport) = subscriber(&list, None);
        socket.receive(r#"{"func":"get","type":"list","name":"l","page":0}"#);
        let frame = transport.last_json().unwrap();
        assert_eq!(frame["error_code"], json!(ErrorCode::MissingField as u8));
        assert!(frame["message"].as_str().unwrap().contains("page_size"));
        assert_eq!(list.cursor_of(&socket), None);
    }

    #[test]
    fn insert_is_windowed() {
        let list = LocalList::with_max_page_size("l", vec![1i64, 2, 3], 2);
        let (_first, first) = subscriber(&list, Some((0, 2)));
        let (_second, second) = subscriber(&list, Some((1, 2)));
        let (_blind, blind) = subscriber(&list, None);

        list.insert(0, 9).unwrap();
        assert_eq!(
            funcs(&first),
            vec![
                json!({"func": "set_count", "total_item_count": 4}),
                json!({"func": "insert", "index": 0, "value": 9}),
            ]
        );
        assert_eq!(funcs(&second), vec![json!({"func": "set_count", "total_item_count": 4})]);
        assert_eq!(funcs(&blind), vec![json!({"func": "set_count", "total_item_count": 4})]);
        assert_eq!(list.items(), vec![9, 1, 2, 3]);
    }

    #[test]
    fn indices_are_page_relative() {
        let list = LocalList::with_max_page_size("l", vec![1i64, 2, 3, 4], 2);
        let (_socket, transport) = subscriber(&list, Some((1, 2)));

        list.delete(3).unwrap();
        assert_eq!(funcs(&transport)[1], json!({"func": "delete", "index": 1}));

        transport.clear();
        list.set(2, 30).unwrap();
        assert_eq!(funcs(&transport), vec![json!({"func": "set", "index": 0, "value": 30})]);

        transport.clear();
        list.set(0, 10).unwrap();
        assert_eq!(funcs(&transport), vec![json!({"func": "set_count", "total_item_count": 3})]);
        assert_eq!(list.items(), vec![10, 2, 30]);
    }

    #[test]
    fn out_of_range_mutations() {
        let list = LocalList::new("l", vec![1i64]);
        let (_socket, transport) = subscriber(&list, Some((0, 10)));
        assert!(matches!(list.set(1, 5), Err(EngineError::BadIndex { index: 1, len: 1 })));
        assert!(matches!(list.delete(1), Err(EngineError::BadIndex { .. })));
        assert!(matches!(list.insert(2, 5), Err(EngineError::BadIndex { .. })));
        assert!(transport.is_empty());
        assert_eq!(list.items(), vec![1]);

        list.push(2).unwrap();
        assert_eq!(list.get(1), Some(2));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn unsubscribe_forgets_cursor() {
        let list = LocalList::new("l", vec![1i64]);
        let (socket, transport) = subscriber(&list, Some((0, 10)));
        socket.receive(r#"{"func":"unsubscribe","type":"list","name":"l"}"#);
        assert_eq!(list.cursor_of(&socket), None);
        assert_eq!(list.subscriber_count(), 0);

        list.push(2).unwrap();
        assert!(transport.is_empty());
    }
}
