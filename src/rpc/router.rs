//! The router: one logical endpoint of the mesh

use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::protocol::{object_payload, Address, Packet, RequestId, RequestPacket, ResponsePacket};
use crate::routing::{MinRtt, RouteChange, RouteSet, Rtt, Via};
use crate::rpc::connection::Connection;
use crate::rpc::handlers::{
    erase_notification_handler, erase_request_handler, HandlerRegistry, NotificationHandler,
    RequestHandler,
};
use crate::rpc::pending::PendingRequest;
use crate::transport::{ChannelEvent, ChannelReceiver, ChannelSender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Advertisement telling a neighbor this node can forward to `to`
#[derive(Debug, Serialize, Deserialize)]
struct AddForwarded {
    to: Address,
    rtt: Rtt,
}

/// Advertisement retracting a forwarded destination
#[derive(Debug, Serialize, Deserialize)]
struct RemoveForwarded {
    to: Address,
}

/// Advertisement adjusting the cost of a forwarded destination
#[derive(Debug, Serialize, Deserialize)]
struct UpdatedForwardedRtt {
    to: Address,
    rtt: Rtt,
}

const ADD_FORWARDED: &str = "AddForwarded";
const REMOVE_FORWARDED: &str = "RemoveForwarded";
const UPDATED_FORWARDED_RTT: &str = "UpdatedForwardedRtt";

/// Notification names the advertisement protocol owns
const RESERVED_NOTIFICATIONS: [&str; 3] =
    [ADD_FORWARDED, REMOVE_FORWARDED, UPDATED_FORWARDED_RTT];

/// Per-call options for [`Router::request_with`]
#[derive(Debug, Default)]
pub struct RequestOptions {
    /// Deadline override; the router config default applies when `None`
    pub timeout: Option<Duration>,
    /// External cancellation signal; whichever of response, timeout, and
    /// cancellation fires first wins
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Create options that fall back to the router defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach an external cancellation signal
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Everything a dispatch step may touch, guarded by one lock
struct RouterState {
    connections: Vec<Connection>,
    routes: RouteSet,
    pending: HashMap<RequestId, PendingRequest>,
    request_handlers: HandlerRegistry<RequestHandler>,
    notification_handlers: HandlerRegistry<NotificationHandler>,
    connect_waiters: Vec<(Address, oneshot::Sender<()>)>,
}

struct RouterInner {
    me: Address,
    config: RouterConfig,
    state: Mutex<RouterState>,
}

/// One logical endpoint: connections, routing table, and RPC dispatch
///
/// Cloning is cheap and shares the underlying node. All routing-table
/// mutation, dispatch, and advertisement logic runs under a single lock that
/// is never held across an `await`, so each dispatch step is sequentially
/// consistent; packets arriving on one channel are processed in order, with
/// no ordering across channels.
///
/// # Example
///
/// ```no_run
/// use portmesh::{Address, Router, Rtt};
/// use portmesh::transport::memory;
/// use serde_json::{json, Value};
///
/// # async fn example() -> portmesh::Result<()> {
/// let background = Router::new(Address::Background);
/// let popup = Router::new(Address::Popup);
///
/// popup.add_request_handler("Echo", |_from, data: Value| async move { Ok(data) });
///
/// let (hub_end, popup_end) = memory::pair();
/// background.add_direct(Address::Popup, hub_end.0, hub_end.1, Rtt(1));
/// popup.add_direct(Address::Background, popup_end.0, popup_end.1, Rtt(1));
///
/// background.wait_for_connection_to(Address::Popup).await?;
/// let echoed: Value = background
///     .request(Address::Popup, "Echo", &json!({ "v": 1 }))
///     .await?;
/// assert_eq!(echoed["v"], json!(1));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Create a router for the given endpoint with default configuration
    pub fn new(me: Address) -> Self {
        Self::with_config(me, RouterConfig::default())
    }

    /// Create a router with explicit timeouts
    pub fn with_config(me: Address, config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                me,
                config,
                state: Mutex::new(RouterState {
                    connections: Vec::new(),
                    routes: RouteSet::new(),
                    pending: HashMap::new(),
                    request_handlers: HandlerRegistry::new("request"),
                    notification_handlers: HandlerRegistry::new("notification"),
                    connect_waiters: Vec::new(),
                }),
            }),
        }
    }

    /// This endpoint's own address
    pub fn address(&self) -> Address {
        self.inner.me
    }

    /// Register a new directly reachable neighbor
    ///
    /// Already being connected to `to` is logged and ignored. On success the
    /// new neighbor is first seeded with an advertisement for every
    /// destination this node can already reach — at the cost it would see
    /// forwarding through this node, which for the neighbor itself means the
    /// best *alternative* path — and only then is the direct route
    /// registered (and advertised onward).
    pub fn add_direct<S, R>(&self, to: Address, sender: S, receiver: R, rtt: Rtt)
    where
        S: ChannelSender,
        R: ChannelReceiver,
    {
        let mut st = self.inner.state.lock();
        if to == self.inner.me {
            error!(%to, "refusing a direct connection to self");
            return;
        }
        if st.connections.iter().any(|c| c.address() == to) {
            error!(%to, "connection was already added");
            return;
        }

        let reader = Self::spawn_reader(Arc::downgrade(&self.inner), to, receiver);
        st.connections
            .push(Connection::new(to, rtt, Box::new(sender), reader));

        for (route, min) in st.routes.list() {
            let offer = if min.via == Via::Peer(to) {
                min.second_best
            } else {
                Some(min.rtt)
            };
            if let Some(offer) = offer {
                self.notify_neighbor(&mut st, to, ADD_FORWARDED, &AddForwarded { to: route, rtt: offer });
            }
        }

        let changes = st.routes.on_add_direct(to, rtt);
        self.apply_route_changes(&mut st, changes);
    }

    /// Tear down a direct connection and every route that depended on it
    ///
    /// Not being connected to `to` is logged and ignored.
    pub fn remove_direct(&self, to: Address) {
        if !self.remove_connection(to) {
            error!(%to, "connection doesn't exist");
        }
    }

    /// Register the handler for a named request
    ///
    /// The handler runs as a spawned task; its result (or failure
    /// description) travels back to the requester as a response packet.
    ///
    /// # Panics
    ///
    /// Panics if a handler is already registered under `request`.
    pub fn add_request_handler<Req, Res, F, Fut>(&self, request: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(Address, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res>> + Send + 'static,
    {
        let mut st = self.inner.state.lock();
        st.request_handlers
            .insert(request, erase_request_handler(handler));
    }

    /// Register the handler for a named notification
    ///
    /// Handler failures are logged; no response is ever produced.
    ///
    /// # Panics
    ///
    /// Panics if a handler is already registered under `request`, or if the
    /// name is reserved for the route-advertisement protocol.
    pub fn add_notification_handler<Req, F, Fut>(&self, request: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        F: Fn(Address, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if RESERVED_NOTIFICATIONS.contains(&request) {
            panic!("{request} is reserved for route advertisements");
        }
        let mut st = self.inner.state.lock();
        st.notification_handlers
            .insert(request, erase_notification_handler(handler));
    }

    /// Send a fire-and-forget notification
    ///
    /// Routing failures are logged, not reported; the only error surfaced
    /// here is a payload that does not serialize to an object.
    pub fn notify<T: Serialize>(&self, to: Address, request: &str, data: &T) -> Result<()> {
        let payload = object_payload(serde_json::to_value(data)?)?;
        let mut st = self.inner.state.lock();
        let packet = RequestPacket::notification(self.inner.me, to, request, payload);
        self.dispatch_request(&mut st, None, packet);
        Ok(())
    }

    /// Issue a request and await its correlated response
    ///
    /// Uses the router's default deadline and no cancellation signal.
    pub async fn request<Req, Res>(&self, to: Address, request: &str, data: &Req) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.request_with(to, request, data, RequestOptions::default())
            .await
    }

    /// Issue a request with an explicit deadline and/or cancellation signal
    ///
    /// Resolves with the remote handler's result, or fails with
    /// [`Error::Remote`] (the handler failed or no route existed),
    /// [`Error::Timeout`], or [`Error::Cancelled`] — whichever terminal
    /// event fires first wins and tears down the others.
    pub async fn request_with<Req, Res>(
        &self,
        to: Address,
        request: &str,
        data: &Req,
        options: RequestOptions,
    ) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let payload = object_payload(serde_json::to_value(data)?)?;
        let rid = RequestId::generate();
        let (pending, rx) = PendingRequest::new();
        {
            let mut st = self.inner.state.lock();
            st.pending.insert(rid.clone(), pending);
            let packet =
                RequestPacket::request(self.inner.me, to, request, rid.clone(), payload);
            self.dispatch_request(&mut st, None, packet);
        }

        let timeout = options
            .timeout
            .unwrap_or(self.inner.config.request_timeout);
        let outcome = tokio::select! {
            outcome = rx => outcome.unwrap_or(Err(Error::Cancelled)),
            _ = tokio::time::sleep(timeout) => {
                error!(request, "timed out request");
                Err(Error::Timeout(request.to_string()))
            }
            _ = cancelled(options.cancel.as_ref()) => Err(Error::Cancelled),
        };
        self.inner.state.lock().pending.remove(&rid);

        let value = outcome?;
        Ok(serde_json::from_value(value)?)
    }

    /// Suspend until a route to `address` exists
    ///
    /// Resolves immediately if one already does; otherwise waits for the
    /// destination to become reachable or for the configured connect
    /// deadline to elapse.
    pub async fn wait_for_connection_to(&self, address: Address) -> Result<()> {
        let rx = {
            let mut st = self.inner.state.lock();
            if st.routes.has(address) {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            st.connect_waiters.push((address, tx));
            rx
        };
        match tokio::time::timeout(self.inner.config.connect_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            _ => Err(Error::ConnectTimeout(address)),
        }
    }

    /// Snapshot of every reachable destination with its cached best costs
    pub fn routes(&self) -> Vec<(Address, MinRtt)> {
        self.inner.state.lock().routes.list()
    }

    /// Close every connection and drop all node state
    pub fn shutdown(&self) {
        let mut st = self.inner.state.lock();
        for connection in st.connections.drain(..) {
            connection.close();
        }
        st.routes = RouteSet::new();
        st.pending.clear();
        st.connect_waiters.clear();
    }

    fn spawn_reader<R: ChannelReceiver>(
        inner: Weak<RouterInner>,
        from: Address,
        mut receiver: R,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = receiver.recv().await;
                let Some(inner) = inner.upgrade() else { break };
                let router = Router { inner };
                match event {
                    ChannelEvent::Message(packet) => {
                        router.handle_incoming(Some(from), packet);
                    }
                    ChannelEvent::Disconnected { error } => {
                        match error {
                            Some(e) => {
                                error!(%from, error = %e, "channel disconnected with an error")
                            }
                            None => debug!(%from, "channel disconnected"),
                        }
                        router.remove_connection(from);
                        break;
                    }
                }
            }
        })
    }

    /// Entry point for every packet, inbound or locally originated
    fn handle_incoming(&self, coming_from: Option<Address>, packet: Packet) {
        let mut st = self.inner.state.lock();
        match packet {
            Packet::Request(p) => self.dispatch_request(&mut st, coming_from, p),
            Packet::Response(p) => self.dispatch_response(&mut st, coming_from, p),
        }
    }

    fn dispatch_request(
        &self,
        st: &mut RouterState,
        coming_from: Option<Address>,
        p: RequestPacket,
    ) {
        let forwarder = coming_from.map(Via::Peer).unwrap_or(Via::Direct);
        if p.sender != self.inner.me && !st.routes.may_be_forwarder_for(forwarder, p.sender) {
            error!(
                sender = %p.sender,
                from = ?coming_from,
                "dropping packet from an illegitimate forwarder"
            );
            return;
        }

        if p.receiver == self.inner.me {
            if p.response.is_none() && self.handle_advertisement(st, &p) {
                return;
            }
            match p.response {
                Some(response_to) => {
                    let Some(handler) = st.request_handlers.get(&p.request) else {
                        error!(request = %p.request, "no request handler registered");
                        return;
                    };
                    let router = self.clone();
                    let from = p.sender;
                    let name = p.request;
                    let rid = response_to.rid;
                    tokio::spawn(async move {
                        let response = match handler(from, p.payload).await {
                            Ok(value) => ResponsePacket::ok(rid, from, value),
                            Err(e) => {
                                error!(request = %name, error = %e, "request handler failed");
                                ResponsePacket::failure(rid, from, e.to_string())
                            }
                        };
                        router.handle_incoming(None, Packet::Response(response));
                    });
                }
                None => {
                    let Some(handler) = st.notification_handlers.get(&p.request) else {
                        error!(request = %p.request, "no notification handler registered");
                        return;
                    };
                    let from = p.sender;
                    let name = p.request;
                    tokio::spawn(async move {
                        if let Err(e) = handler(from, p.payload).await {
                            error!(notification = %name, error = %e, "notification handler failed");
                        }
                    });
                }
            }
            return;
        }

        // Loop avoidance blacklists only the immediate hop; cycles longer
        // than two hops are a known limitation of the advertisement scheme.
        let exclude: Vec<Address> = coming_from.into_iter().collect();
        match Self::connection_for(st, p.receiver, &exclude) {
            Some(connection) => {
                if let Err(e) = connection.send(Packet::Request(p)) {
                    error!(error = %e, "failed to forward packet");
                }
            }
            None => {
                error!(
                    receiver = %p.receiver,
                    request = %p.request,
                    "could not forward packet"
                );
                // The producer gets a prompt rejection instead of a timeout.
                if let Some(response_to) = p.response {
                    let failure = ResponsePacket::failure(
                        response_to.rid,
                        p.sender,
                        Error::NoRoute(p.receiver).to_string(),
                    );
                    self.dispatch_response(st, None, failure);
                }
            }
        }
    }

    fn dispatch_response(
        &self,
        st: &mut RouterState,
        coming_from: Option<Address>,
        p: ResponsePacket,
    ) {
        if p.request_origin == self.inner.me {
            let Some(pending) = st.pending.remove(&p.rid) else {
                error!(rid = %p.rid, "received response for unknown request");
                return;
            };
            let outcome = match p.error {
                Some(e) => Err(Error::Remote(e)),
                None => Ok(p.payload),
            };
            pending.complete(outcome);
            return;
        }

        let exclude: Vec<Address> = coming_from.into_iter().collect();
        match Self::connection_for(st, p.request_origin, &exclude) {
            Some(connection) => {
                if let Err(e) = connection.send(Packet::Response(p)) {
                    error!(error = %e, "failed to forward response");
                }
            }
            None => {
                error!(origin = %p.request_origin, "could not forward response");
            }
        }
    }

    /// Consume the packet if it is a route advertisement for this node
    fn handle_advertisement(&self, st: &mut RouterState, p: &RequestPacket) -> bool {
        match p.request.as_str() {
            ADD_FORWARDED => {
                let add: AddForwarded = match serde_json::from_value(p.payload.clone()) {
                    Ok(add) => add,
                    Err(e) => {
                        error!(error = %e, "malformed AddForwarded advertisement");
                        return true;
                    }
                };
                if Self::direct_connection(st, p.sender).is_none() {
                    error!(via = %p.sender, "advertising via should be directly connected");
                    return true;
                }
                let changes = st.routes.inc(add.to, Via::Peer(p.sender), add.rtt);
                self.apply_route_changes(st, changes);
                true
            }
            REMOVE_FORWARDED => {
                let remove: RemoveForwarded = match serde_json::from_value(p.payload.clone()) {
                    Ok(remove) => remove,
                    Err(e) => {
                        error!(error = %e, "malformed RemoveForwarded advertisement");
                        return true;
                    }
                };
                if Self::direct_connection(st, p.sender).is_none() {
                    error!(via = %p.sender, "advertising via should be directly connected");
                    return true;
                }
                let changes = st.routes.dec(remove.to, Via::Peer(p.sender));
                self.apply_route_changes(st, changes);
                true
            }
            UPDATED_FORWARDED_RTT => {
                let update: UpdatedForwardedRtt = match serde_json::from_value(p.payload.clone())
                {
                    Ok(update) => update,
                    Err(e) => {
                        error!(error = %e, "malformed UpdatedForwardedRtt advertisement");
                        return true;
                    }
                };
                let changes = st.routes.update(update.to, Via::Peer(p.sender), update.rtt);
                self.apply_route_changes(st, changes);
                true
            }
            _ => false,
        }
    }

    /// Fan a batch of routing-table changes out as advertisements
    ///
    /// Broadcast goes only to directly connected neighbors other than the
    /// one a change concerns: the sole via of a destination already knows
    /// about it, the primary via of a destination is told the secondary cost
    /// (its best alternative), everyone else the primary cost.
    fn apply_route_changes(&self, st: &mut RouterState, changes: Vec<RouteChange>) {
        for change in changes {
            match change {
                RouteChange::Added { address, via, rtt } => {
                    self.wake_connect_waiters(st, address);
                    for neighbor in Self::neighbors(st) {
                        if neighbor == address || via == Via::Peer(neighbor) {
                            continue;
                        }
                        self.notify_neighbor(
                            st,
                            neighbor,
                            ADD_FORWARDED,
                            &AddForwarded { to: address, rtt },
                        );
                    }
                }
                RouteChange::Removed { address, via } => {
                    for neighbor in Self::neighbors(st) {
                        if neighbor == address || via == Via::Peer(neighbor) {
                            continue;
                        }
                        self.notify_neighbor(
                            st,
                            neighbor,
                            REMOVE_FORWARDED,
                            &RemoveForwarded { to: address },
                        );
                    }
                }
                RouteChange::Seconded {
                    address,
                    initial_via,
                    rtt,
                } => {
                    // The previously sole via now has a fallback through us.
                    if let Via::Peer(neighbor) = initial_via {
                        if Self::direct_connection(st, neighbor).is_some() {
                            self.notify_neighbor(
                                st,
                                neighbor,
                                ADD_FORWARDED,
                                &AddForwarded { to: address, rtt },
                            );
                        }
                    }
                }
                RouteChange::Unseconded { address, only_via } => {
                    if let Via::Peer(neighbor) = only_via {
                        if Self::direct_connection(st, neighbor).is_some() {
                            self.notify_neighbor(
                                st,
                                neighbor,
                                REMOVE_FORWARDED,
                                &RemoveForwarded { to: address },
                            );
                        }
                    }
                }
                RouteChange::MinRttChanged {
                    address,
                    min,
                    first_changed,
                    second_changed,
                } => {
                    for neighbor in Self::neighbors(st) {
                        let via_is_neighbor = min.via == Via::Peer(neighbor);
                        let (rtt, changed) = if via_is_neighbor {
                            (min.second_best, second_changed)
                        } else {
                            (Some(min.rtt), first_changed)
                        };
                        if !changed {
                            continue;
                        }
                        if let Some(rtt) = rtt {
                            self.notify_neighbor(
                                st,
                                neighbor,
                                UPDATED_FORWARDED_RTT,
                                &UpdatedForwardedRtt { to: address, rtt },
                            );
                        }
                    }
                }
            }
        }
    }

    /// Send an internal advertisement notification while holding the lock
    fn notify_neighbor<T: Serialize>(
        &self,
        st: &mut RouterState,
        to: Address,
        request: &str,
        data: &T,
    ) {
        let payload = match serde_json::to_value(data).map(object_payload) {
            Ok(Ok(payload)) => payload,
            _ => {
                error!(request, "failed to serialize advertisement");
                return;
            }
        };
        let packet = RequestPacket::notification(self.inner.me, to, request, payload);
        self.dispatch_request(st, None, packet);
    }

    fn wake_connect_waiters(&self, st: &mut RouterState, address: Address) {
        let mut i = 0;
        while i < st.connect_waiters.len() {
            let matches = st.connect_waiters[i].0 == address;
            if matches || st.connect_waiters[i].1.is_closed() {
                let (_, tx) = st.connect_waiters.swap_remove(i);
                if matches {
                    let _ = tx.send(());
                }
            } else {
                i += 1;
            }
        }
    }

    fn remove_connection(&self, to: Address) -> bool {
        let mut st = self.inner.state.lock();
        let Some(index) = st.connections.iter().position(|c| c.address() == to) else {
            return false;
        };
        let connection = st.connections.remove(index);
        connection.close();
        let changes = st.routes.on_remove_direct(to);
        self.apply_route_changes(&mut st, changes);
        true
    }

    fn neighbors(st: &RouterState) -> Vec<Address> {
        st.connections.iter().map(|c| c.address()).collect()
    }

    fn direct_connection(st: &RouterState, address: Address) -> Option<&Connection> {
        st.connections.iter().find(|c| c.address() == address)
    }

    /// Best sink for a packet toward `address`: direct if possible, else the
    /// cheapest non-excluded forwarder
    fn connection_for<'a>(
        st: &'a RouterState,
        address: Address,
        exclude: &[Address],
    ) -> Option<&'a Connection> {
        if let Some(connection) = Self::direct_connection(st, address) {
            return Some(connection);
        }
        match st.routes.forwarder_for(address, exclude)? {
            Via::Peer(peer) => Self::direct_connection(st, peer),
            Via::Direct => None,
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("address", &self.inner.me)
            .finish_non_exhaustive()
    }
}

/// Resolve when the token fires; never, when no token was supplied
async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
