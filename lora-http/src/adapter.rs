//! HTTP adapter: inbound requests become pending requests consumed through `next` and
//! `next_registration`; outbound packets go to explicit recipients or to the broadcast set.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lora_core::{Failure, Packet, RPacket, Recipient, Registration};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::acknacker::{AckNacker, MsgRes};
use crate::broadcast;
use crate::error::SendError;
use crate::handlers::Handler;
use crate::routes::RouteTable;
use crate::server;
use crate::stats::Stats;

/// Default bound on outbound recipient calls.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default bound a handler waits for the queue slot and then for the response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default bound on receiving a whole request from a client.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound request waiting for a decision. `chresp` is `None` when nobody waits for the answer.
#[derive(Debug)]
pub struct PendingRequest<T> {
    pub payload: T,
    pub chresp: Option<mpsc::Sender<MsgRes>>,
}

impl<T> PendingRequest<T> {
    /// True once the requester stopped waiting; nobody can receive the answer anymore.
    pub fn is_abandoned(&self) -> bool {
        self.chresp.as_ref().map_or(false, |tx| tx.is_closed())
    }
}

pub type PktReq = PendingRequest<RPacket>;
pub type RegReq = PendingRequest<Registration>;

/// Writer ends of the pending queues, handed to every handler invocation.
#[derive(Clone)]
pub struct Queues {
    packets: mpsc::Sender<PktReq>,
    registrations: mpsc::Sender<RegReq>,
    wait: Duration,
    stats: Arc<Stats>,
}

impl Queues {
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Enqueue a packet and wait for the consumer's answer.
    pub async fn submit_packet(&self, packet: RPacket) -> MsgRes {
        self.stats.record_packet();
        self.submit(&self.packets, packet).await
    }

    /// Enqueue a registration and wait for the consumer's answer.
    pub async fn submit_registration(&self, registration: Registration) -> MsgRes {
        self.stats.record_registration();
        self.submit(&self.registrations, registration).await
    }

    async fn submit<T>(&self, queue: &mpsc::Sender<PendingRequest<T>>, payload: T) -> MsgRes {
        let (tx, mut rx) = mpsc::channel(1);
        let req = PendingRequest {
            payload,
            chresp: Some(tx),
        };
        if queue.send_timeout(req, self.wait).await.is_err() {
            self.stats.record_timeout();
            warn!("no consumer took the request within {:?}", self.wait);
            return MsgRes::new(
                400,
                Failure::Operational("core server not responding".into()).to_string(),
            );
        }
        match tokio::time::timeout(self.wait, rx.recv()).await {
            Ok(Some(res)) => res,
            Ok(None) => MsgRes::new(
                500,
                Failure::Operational("core server dropped the request".into()).to_string(),
            ),
            Err(_) => {
                self.stats.record_timeout();
                warn!("no response within {:?}", self.wait);
                MsgRes::new(
                    500,
                    Failure::Operational("core server did not respond in time".into()).to_string(),
                )
            }
        }
    }
}

/// Tunables for an [`Adapter`].
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub client_timeout: Duration,
    pub response_timeout: Duration,
    pub read_timeout: Duration,
    /// Fixed recipient set used when `send` gets no explicit recipients.
    pub broadcast: Vec<Recipient>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            broadcast: Vec::new(),
        }
    }
}

struct Inbound {
    packets: mpsc::Receiver<PktReq>,
}

struct InboundRegistrations {
    requested: mpsc::Receiver<RegReq>,
    synthesized: mpsc::UnboundedReceiver<Registration>,
}

pub struct Adapter {
    routes: Arc<RouteTable>,
    queues: Queues,
    inbound: Mutex<Inbound>,
    registrations: Mutex<InboundRegistrations>,
    synthesized: mpsc::UnboundedSender<Registration>,
    client: reqwest::Client,
    broadcast: Vec<Recipient>,
    read_timeout: Duration,
    packet_endpoints: AtomicUsize,
    server: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Adapter {
    pub fn new(opts: AdapterOptions) -> Result<Self, Failure> {
        let client = reqwest::Client::builder()
            .timeout(opts.client_timeout)
            .build()
            .map_err(|e| Failure::Operational(format!("http client: {}", e)))?;
        let (pkt_tx, pkt_rx) = mpsc::channel(1);
        let (reg_tx, reg_rx) = mpsc::channel(1);
        let (syn_tx, syn_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Stats::new());
        Ok(Self {
            routes: Arc::new(RouteTable::new()),
            queues: Queues {
                packets: pkt_tx,
                registrations: reg_tx,
                wait: opts.response_timeout,
                stats,
            },
            inbound: Mutex::new(Inbound { packets: pkt_rx }),
            registrations: Mutex::new(InboundRegistrations {
                requested: reg_rx,
                synthesized: syn_rx,
            }),
            synthesized: syn_tx,
            client,
            broadcast: opts.broadcast,
            read_timeout: opts.read_timeout,
            packet_endpoints: AtomicUsize::new(0),
            server: std::sync::Mutex::new(None),
        })
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.queues.stats.clone()
    }

    pub fn broadcast_recipients(&self) -> &[Recipient] {
        &self.broadcast
    }

    /// Writer side of the pending queues, as handlers see it.
    pub fn queues(&self) -> Queues {
        self.queues.clone()
    }

    /// Attach a handler. Can be called before or after `listen`.
    pub fn bind<H: Handler + 'static>(&self, handler: H) {
        if handler.produces_packets() {
            self.packet_endpoints.fetch_add(1, Ordering::SeqCst);
        }
        info!("binding handler on {}", handler.url());
        self.routes.insert(Arc::new(handler));
    }

    /// Start the HTTP listener. Returns the bound address (useful with port 0).
    pub async fn listen(&self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let task = tokio::spawn(server::serve(
            listener,
            self.routes.clone(),
            self.queues.clone(),
            self.read_timeout,
        ));
        let mut slot = match self.server.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
        info!("listening on {}", local);
        Ok(local)
    }

    /// Send `packet` to `recipients`, or to the broadcast set when `recipients` is empty.
    /// Resolves to the single accepting recipient's answer.
    pub async fn send(
        &self,
        packet: &dyn Packet,
        recipients: &[Recipient],
    ) -> Result<RPacket, SendError> {
        let body = packet.marshal_binary().map_err(SendError::InvalidPacket)?;
        if recipients.is_empty() {
            return self.broadcast_packet(packet, body).await;
        }
        debug!("sending packet to {} recipient(s)", recipients.len());
        let outcomes = broadcast::fan_out(&self.client, recipients, body).await;
        broadcast::tally(outcomes).map(|(_, answer)| answer)
    }

    async fn broadcast_packet(
        &self,
        packet: &dyn Packet,
        body: Vec<u8>,
    ) -> Result<RPacket, SendError> {
        let dev_addr = packet.dev_addr().map_err(SendError::InvalidPacket)?;
        debug!(
            "broadcasting packet for {} to {} recipient(s)",
            dev_addr,
            self.broadcast.len()
        );
        let outcomes = broadcast::fan_out(&self.client, &self.broadcast, body).await;
        let resolved = broadcast::resolve(outcomes, dev_addr);
        self.queues.stats.record_broadcast(resolved.is_err());
        let (answer, registration) = resolved?;
        info!("{} now handled by {}", dev_addr, registration.recipient);
        if self.synthesized.send(registration).is_err() {
            warn!("registration queue closed, dropping registration for {}", dev_addr);
        }
        Ok(answer)
    }

    /// Wait for the next inbound packet.
    pub async fn next(&self) -> Result<(RPacket, AckNacker), Failure> {
        if self.packet_endpoints.load(Ordering::SeqCst) == 0 {
            return Err(Failure::Implementation(
                "packet delivery not supported: no packet endpoint bound".into(),
            ));
        }
        let mut inbound = self.inbound.lock().await;
        loop {
            let req = inbound
                .packets
                .recv()
                .await
                .ok_or_else(|| Failure::Operational("packet queue closed".into()))?;
            if req.is_abandoned() {
                debug!("skipping packet whose requester already gave up");
                continue;
            }
            let an = match req.chresp {
                Some(tx) => AckNacker::for_packet(tx, Some(self.queues.stats.clone())),
                None => AckNacker::void(),
            };
            return Ok((req.payload, an));
        }
    }

    /// Wait for the next registration, requested over HTTP or produced by a broadcast.
    pub async fn next_registration(&self) -> Result<(Registration, AckNacker), Failure> {
        let mut inbound = self.registrations.lock().await;
        let InboundRegistrations {
            requested,
            synthesized,
        } = &mut *inbound;
        loop {
            let req = tokio::select! {
                Some(reg) = synthesized.recv() => return Ok((reg, AckNacker::void())),
                Some(req) = requested.recv() => req,
                else => return Err(Failure::Operational("registration queues closed".into())),
            };
            if req.is_abandoned() {
                debug!(
                    "skipping registration of {} whose requester already gave up",
                    req.payload.dev_addr
                );
                continue;
            }
            let an = match req.chresp {
                Some(tx) => AckNacker::for_registration(tx, Some(self.queues.stats.clone())),
                None => AckNacker::void(),
            };
            return Ok((req.payload, an));
        }
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        let slot = match self.server.get_mut() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = slot.take() {
            task.abort();
        }
    }
}
