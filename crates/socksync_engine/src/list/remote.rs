use crate::error::{EngineError, EngineResult};
use crate::group::{Dispatcher, Group, RemoteCore, SyncValue};
use crate::socket::Socket;
use parking_lot::Mutex;
use serde_json::Value;
use socksync_protocol::{
    Envelope, GroupId, ListDelete, ListGet, ListInsert, ListSet, ListSetAll, ListSetCount,
};
use std::sync::Arc;

struct Window<T> {
    items: Vec<T>,
    page: usize,
    page_size: usize,
    total_item_count: usize,
}

/// A cached page of a list owned by the peer.
///
/// Deltas arrive with page-relative indices and apply directly to the
/// cached window. `total_item_count` is advisory: it follows whatever the
/// peer last reported in `set_all` or `set_count`. The owner precedes every
/// windowed `insert`/`delete` with a `set_count`, so the deltas leave it alone.
pub struct RemoteList<T = Value> {
    core: RemoteCore,
    dispatcher: Dispatcher<RemoteList<T>>,
    window: Mutex<Window<T>>,
}

impl<T: SyncValue> RemoteList<T> {
    /// Binds a mirror of the peer's list `name` to `socket`.
    ///
    /// With `subscribe` set, subscribes and requests the first page.
    pub fn new(name: impl Into<String>, socket: &Arc<Socket>, subscribe: bool) -> EngineResult<Arc<Self>> {
        let core = RemoteCore::new(GroupId::list(name), socket);
        let dispatcher = Dispatcher::new()
            .register_receive::<ListSetAll>(true, Self::on_set_all)
            .register_receive::<ListSetCount>(true, |list: &Self, args, _| {
                list.window.lock().total_item_count = args.total_item_count;
                Ok(())
            })
            .register_receive::<ListInsert>(true, Self::on_insert)
            .register_receive::<ListDelete>(true, Self::on_delete)
            .register_receive::<ListSet>(true, Self::on_set);
        let list = Arc::new(Self {
            core,
            dispatcher,
            window: Mutex::new(Window {
                items: Vec::new(),
                page: 0,
                page_size: socket.config().default_page_size,
                total_item_count: 0,
            }),
        });
        list.core.attach(Arc::clone(&list), subscribe, Self::get)
    }

    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        self.core.id()
    }

    /// Returns a copy of the cached window.
    pub fn items(&self) -> Vec<T> {
        self.window.lock().items.clone()
    }

    /// Returns the cached page number.
    pub fn page(&self) -> usize {
        self.window.lock().page
    }

    /// Returns the page size in use.
    pub fn page_size(&self) -> usize {
        self.window.lock().page_size
    }

    /// Returns the item count the peer last reported.
    pub fn total_item_count(&self) -> usize {
        self.window.lock().total_item_count
    }

    /// Returns the number of pages of the current size.
    pub fn pages(&self) -> usize {
        let window = self.window.lock();
        if window.page_size == 0 {
            return 0;
        }
        window.total_item_count.div_ceil(window.page_size)
    }

    /// Requests page `page` using the current page size.
    pub fn get_page(&self, page: usize) -> EngineResult<()> {
        let page_size = self.page_size();
        self.core.send(&ListGet { page, page_size })
    }

    /// Requests a page with an explicit page size.
    ///
    /// The peer may serve a smaller page; the echoed size is adopted on `set_all`.
    pub fn get_page_sized(&self, page: usize, page_size: usize) -> EngineResult<()> {
        self.core.send(&ListGet { page, page_size })
    }

    /// Requests the current page again.
    pub fn get(&self) -> EngineResult<()> {
        self.get_page(self.page())
    }

    /// Subscribes to the peer's list.
    pub fn subscribe(&self) -> EngineResult<()> {
        self.core.subscribe()
    }

    /// Unsubscribes from the peer's list.
    pub fn unsubscribe(&self) -> EngineResult<()> {
        self.core.unsubscribe()
    }

    /// Returns true while subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.core.subscribed()
    }

    fn on_set_all(&self, args: ListSetAll, _: &Arc<Socket>) -> EngineResult<()> {
        let items = args
            .items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(EngineError::invalid_value)?;
        *self.window.lock() = Window {
            items,
            page: args.page,
            page_size: args.page_size,
            total_item_count: args.total_item_count,
        };
        Ok(())
    }

    fn on_insert(&self, args: ListInsert, _: &Arc<Socket>) -> EngineResult<()> {
        let value = serde_json::from_value(args.value).map_err(EngineError::invalid_value)?;
        let mut window = self.window.lock();
        let len = window.items.len();
        if args.index > len {
            return Err(EngineError::BadIndex {
                index: args.index,
                len,
            });
        }
        window.items.insert(args.index, value);
        let page_size = window.page_size;
        window.items.truncate(page_size);
        Ok(())
    }

    fn on_delete(&self, args: ListDelete, _: &Arc<Socket>) -> EngineResult<()> {
        let mut window = self.window.lock();
        let len = window.items.len();
        if args.index >= len {
            return Err(EngineError::BadIndex {
                index: args.index,
                len,
            });
        }
        window.items.remove(args.index);
        Ok(())
    }

    fn on_set(&self, args: ListSet, _: &Arc<Socket>) -> EngineResult<()> {
        let value = serde_json::from_value(args.value).map_err(EngineError::invalid_value)?;
        let mut window = self.window.lock();
        let len = window.items.len();
        let slot = window.items.get_mut(args.index).ok_or(EngineError::BadIndex {
            index: args.index,
            len,
        })?;
        *slot = value;
        Ok(())
    }
}

impl<T: SyncValue> Group for RemoteList<T> {
    fn id(&self) -> &GroupId {
        self.core.id()
    }

    fn handle_func(&self, envelope: &Envelope, socket: &Arc<Socket>) {
        self.dispatcher.handle_func(self, envelope, socket);
    }

    fn sockets(&self) -> Vec<Arc<Socket>> {
        vec![Arc::clone(self.core.socket())]
    }

    fn is_subscribed(&self, socket: &Socket) -> bool {
        self.core.is_subscribed(socket)
    }

    fn reset_subscription(&self) {
        self.core.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use socksync_protocol::ErrorCode;

    fn mirror() -> (Arc<RemoteList<i64>>, Arc<Socket>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let socket = Socket::with_config(transport.clone(), EngineConfig::new().with_default_page_size(2));
        let list = RemoteList::new("l", &socket, true).unwrap();
        socket.receive(
            r#"{"func":"set_all","type":"list","name":"l","page":0,"page_size":2,"total_item_count":3,"items":[1,2]}"#,
        );
        transport.clear();
        (list, socket, transport)
    }

    fn last_code(transport: &MemoryTransport) -> Value {
        transport.last_json().unwrap()["error_code"].clone()
    }

    #[test]
    fn primes_first_page() {
        let transport = Arc::new(MemoryTransport::new());
        let socket = Socket::with_config(transport.clone(), EngineConfig::new().with_default_page_size(5));
        let list = RemoteList::<i64>::new("l", &socket, true).unwrap();
        let frames = transport.json_frames();
        assert_eq!(frames[0]["func"], json!("subscribe"));
        assert_eq!(
            frames[1],
            json!({"func": "get", "type": "list", "name": "l", "page": 0, "page_size": 5})
        );
        assert!(list.items().is_empty());
    }

    #[test]
    fn set_all_replaces_window() {
        let (list, _, transport) = mirror();
        assert_eq!(list.items(), vec![1, 2]);
        assert_eq!(list.total_item_count(), 3);
        assert_eq!(list.pages(), 2);
        assert!(transport.is_empty());
    }

    #[test]
    fn deltas_apply_to_window() {
        let (list, socket, transport) = mirror();
        socket.receive(r#"{"func":"set_count","type":"list","name":"l","total_item_count":4}"#);
        socket.receive(r#"{"func":"insert","type":"list","name":"l","index":0,"value":9}"#);
        assert_eq!(list.items(), vec![9, 1]);
        assert_eq!(list.total_item_count(), 4);

        socket.receive(r#"{"func":"set","type":"list","name":"l","index":1,"value":7}"#);
        socket.receive(r#"{"func":"set_count","type":"list","name":"l","total_item_count":3}"#);
        socket.receive(r#"{"func":"delete","type":"list","name":"l","index":0}"#);
        assert_eq!(list.items(), vec![7]);
        assert_eq!(list.total_item_count(), 3);
        assert!(transport.is_empty());
    }

    #[test]
    fn out_of_window_indices_are_rejected() {
        let (list, socket, transport) = mirror();
        socket.receive(r#"{"func":"set","type":"list","name":"l","index":2,"value":7}"#);
        assert_eq!(last_code(&transport), json!(ErrorCode::BadIndex as u8));
        socket.receive(r#"{"func":"delete","type":"list","name":"l","index":2}"#);
        assert_eq!(last_code(&transport), json!(ErrorCode::BadIndex as u8));
        socket.receive(r#"{"func":"insert","type":"list","name":"l","index":3,"value":7}"#);
        assert_eq!(last_code(&transport), json!(ErrorCode::BadIndex as u8));

        assert_eq!(transport.len(), 3);
        assert_eq!(list.items(), vec![1, 2]);
        assert_eq!(list.total_item_count(), 3);
    }

    #[test]
    fn deltas_require_subscription() {
        let (list, socket, transport) = mirror();
        list.unsubscribe().unwrap();
        transport.clear();

        socket.receive(r#"{"func":"delete","type":"list","name":"l","index":0}"#);
        assert_eq!(last_code(&transport), json!(ErrorCode::InvalidFunc as u8));
        assert_eq!(list.items(), vec![1, 2]);
    }

    #[test]
    fn page_requests() {
        let (list, _, transport) = mirror();
        list.get_page(1).unwrap();
        assert_eq!(
            transport.last_json().unwrap(),
            json!({"func": "get", "type": "list", "name": "l", "page": 1, "page_size": 2})
        );
        list.get_page_sized(0, 10).unwrap();
        assert_eq!(transport.last_json().unwrap()["page_size"], json!(10));
        list.get().unwrap();
        assert_eq!(transport.last_json().unwrap()["page"], json!(0));
    }

    #[test]
    fn zero_page_size_has_no_pages() {
        let (list, socket, _) = mirror();
        socket.receive(
            r#"{"func":"set_all","type":"list","name":"l","page":0,"page_size":0,"total_item_count":3,"items":[]}"#,
        );
        assert_eq!(list.pages(), 0);
    }
}
