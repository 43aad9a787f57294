//! Mesh file-transfer simulator.
//!
//! Runs a sending and a receiving node in one process, joined by a simulated
//! radio link that can lose and duplicate packets, and moves one file between
//! them with the transfer engine. The receiver accepts every offer and
//! re-requests missing parts whenever the transfer goes idle.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::Parser;
use mesh_events::AckCorrelator;
use mesh_storage::{open_store, MessageKind, MessageStore, StorageMode, StoredMessage};
use mesh_transfer::{
    Direction, EngineConfig, EngineEvent, EventNotifier, FileTransferEngine, PacketDispatcher, TransferEvent,
    TransferStatus,
};
use mesh_wire::{MeshPacket, NodeId, PortNum, TransferId};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument, Span};
use tracing_subscriber::EnvFilter;

mod config;
mod link;
mod logging;

use config::XferConfig;
use link::{LinkQuality, SimulatedLink};
use logging::XferLogFormatter;

/// Send a file between two simulated mesh nodes
#[derive(Parser, Debug)]
#[command(name = "mesh-xfer", version, about = "Send a file between two simulated mesh nodes")]
struct Args {
    /// File to send
    file: PathBuf,

    /// Where the receiving node writes the reassembled file
    #[arg(long, short, default_value = "received.bin")]
    output: PathBuf,

    /// Configuration file path
    #[arg(long, default_value = "xfer.yaml")]
    config: PathBuf,

    /// Part size the receiver accepts with, in bytes
    #[arg(long)]
    part_size: Option<u32>,

    /// Probability that a packet is lost, 0 to 1
    #[arg(long)]
    loss_rate: Option<f64>,

    /// Probability that a packet arrives twice, 0 to 1
    #[arg(long)]
    duplicate_rate: Option<f64>,

    /// Idle time before missing parts are re-requested, e.g. 2s
    #[arg(long)]
    retry_interval: Option<humantime::Duration>,

    /// Give up after this long, e.g. 5m
    #[arg(long, default_value = "5m")]
    timeout: humantime::Duration,

    /// Storage mode for the sender's message store: memory, file
    #[arg(long)]
    storage_mode: Option<String>,

    /// Data directory for file storage
    #[arg(long)]
    storage_data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Command-line flags win over file and environment
    fn apply(&self, config: &mut XferConfig) {
        if let Some(part_size) = self.part_size {
            config.part_size = part_size;
        }
        if let Some(rate) = self.loss_rate {
            config.loss_rate = rate;
        }
        if let Some(rate) = self.duplicate_rate {
            config.duplicate_rate = rate;
        }
        if let Some(interval) = self.retry_interval {
            config.retry_interval_ms = Duration::from(interval).as_millis() as u64;
        }
        if let Some(mode) = &self.storage_mode {
            config.storage.mode = mode.clone();
        }
        if let Some(dir) = &self.storage_data_dir {
            config.storage.data_dir = dir.clone();
        }
    }
}

/// One simulated radio node
struct SimNode {
    id: NodeId,
    dispatcher: Arc<Mutex<PacketDispatcher>>,
    link: Arc<SimulatedLink>,
    span: Span,
}

impl SimNode {
    fn new(
        id: NodeId,
        link: Arc<SimulatedLink>,
        store: Arc<dyn MessageStore>,
        config: &XferConfig,
        notifier: &EventNotifier,
    ) -> Self {
        let engine_config = EngineConfig {
            max_payload_len: config.max_payload_len,
        };
        let mut engine = FileTransferEngine::new(id, link.clone(), engine_config);
        engine.add_listener(Arc::new(notifier.clone()));

        let mut acks = AckCorrelator::new(store);
        acks.add_listener(Arc::new(notifier.clone()));

        Self {
            id,
            dispatcher: Arc::new(Mutex::new(PacketDispatcher::new(engine, acks))),
            link,
            span: info_span!("node", node = %id),
        }
    }

    /// Feed the inbox to the dispatcher, acking every packet addressed to us
    fn spawn_receiver(&self, mut inbox: mpsc::UnboundedReceiver<MeshPacket>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let link = Arc::clone(&self.link);
        let local = self.id;
        let span = self.span.clone();

        tokio::spawn(
            async move {
                while let Some(packet) = inbox.recv().await {
                    dispatcher.lock().await.handle_packet(&packet).await;

                    let wants_ack = packet.to == local
                        && packet
                            .data()
                            .map_or(false, |data| data.portnum != PortNum::Routing);
                    if wants_ack {
                        if let Err(e) = link.send_ack(packet.from, packet.id) {
                            component_debug!("link", "Failed to ack packet {}: {}", packet.id, e);
                        }
                    }
                }
            }
            .instrument(span),
        )
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut env_filter = EnvFilter::new("warn");
    for target in ["mesh_xfer", "mesh_transfer", "mesh_events", "mesh_storage", "mesh_wire"] {
        env_filter = env_filter.add_directive(format!("{}={}", target, args.log_level).parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        // Span fields are read back by the formatter, keep them plain
        .with_ansi(false)
        .event_format(XferLogFormatter::new())
        .init();

    info!("Starting mesh file-transfer simulator v{}", env!("CARGO_PKG_VERSION"));

    let mut config = XferConfig::load_from_file(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    let data = Bytes::from(
        tokio::fs::read(&args.file)
            .await
            .with_context(|| format!("reading {:?}", args.file))?,
    );
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let local = config.local_node()?;
    let peer = config.peer_node()?;
    let quality = LinkQuality {
        loss_rate: config.loss_rate,
        duplicate_rate: config.duplicate_rate,
    };

    let (notifier, mut events) = EventNotifier::channel();
    let (sender_tx, sender_inbox) = mpsc::unbounded_channel();
    let (receiver_tx, receiver_inbox) = mpsc::unbounded_channel();

    let sender_store = open_store(config.storage_mode()?)
        .await
        .context("opening message store")?;
    let sender = SimNode::new(
        local,
        Arc::new(SimulatedLink::new(local, receiver_tx, quality)),
        sender_store.clone(),
        &config,
        &notifier,
    );
    let receiver = SimNode::new(
        peer,
        Arc::new(SimulatedLink::new(peer, sender_tx, quality)),
        open_store(StorageMode::InMemory).await?,
        &config,
        &notifier,
    );
    receiver
        .dispatcher
        .lock()
        .await
        .add_packet_listener(Arc::new(notifier.clone()));

    let _sender_task = sender.spawn_receiver(sender_inbox);
    let _receiver_task = receiver.spawn_receiver(receiver_inbox);

    component_info!(
        "sim",
        "Sending {} ({} bytes) from {} to {}, loss={}, duplicates={}",
        file_name,
        data.len(),
        local,
        peer,
        config.loss_rate,
        config.duplicate_rate
    );

    // Chat note ahead of the offer; its routing ack marks it delivered in the store
    let note = format!("sending {} ({} bytes)", file_name, data.len());
    let note_id = sender.link.next_packet_id();
    sender_store
        .insert(StoredMessage::new(note_id, local, peer, MessageKind::Direct, note.clone()))
        .await?;
    sender
        .link
        .send_packet(note_id, peer, PortNum::TextMessage, Bytes::from(note))?;

    let mut transfer_id = sender
        .dispatcher
        .lock()
        .await
        .engine_mut()
        .offer_file(peer, file_name.clone(), data.clone())
        .instrument(sender.span.clone())
        .await?;

    let retry_interval = config.retry_interval();
    let mut retry = tokio::time::interval_at(tokio::time::Instant::now() + retry_interval, retry_interval);
    let deadline = tokio::time::sleep(Duration::from(args.timeout));
    tokio::pin!(deadline);

    let mut idle_rounds = 0u32;
    let mut last_received = 0usize;
    let mut packets_seen = 0u64;

    let blob = loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                EngineEvent::Transfer(TransferEvent::Updated(snapshot)) => {
                    component_debug!(
                        "events",
                        "Transfer {} ({:?}) {} {}%",
                        snapshot.id, snapshot.direction, snapshot.status, snapshot.progress
                    );
                    if snapshot.direction != Direction::Incoming {
                        continue;
                    }
                    match snapshot.status {
                        TransferStatus::Offering => {
                            let mut node = receiver.dispatcher.lock().await;
                            if let Err(e) = node
                                .engine_mut()
                                .accept(&snapshot.id, config.part_size)
                                .instrument(receiver.span.clone())
                                .await {
                                component_warn!("sim", "Could not accept {}: {}", snapshot.id, e);
                            }
                        }
                        TransferStatus::Complete => {
                            let node = receiver.dispatcher.lock().await;
                            if let Some(blob) = node.engine().transfer(&snapshot.id).and_then(|t| t.blob().cloned()) {
                                break blob;
                            }
                        }
                        _ => {}
                    }
                }
                EngineEvent::Transfer(TransferEvent::Removed(id)) => {
                    component_debug!("events", "Transfer {} removed", id);
                }
                EngineEvent::Ack(ack) => {
                    component_debug!(
                        "events",
                        "Ack for packet {} from {} ({:?} hops)",
                        ack.request_id, ack.acked_by, ack.hops_away
                    );
                }
                EngineEvent::Packet(_) => packets_seen += 1,
            },
            _ = retry.tick() => {
                let progress = receiver
                    .dispatcher
                    .lock()
                    .await
                    .engine()
                    .transfer(&transfer_id)
                    .map(|t| t.chunks().len());
                if progress.is_some_and(|received| received > last_received) {
                    last_received = progress.unwrap_or(last_received);
                    idle_rounds = 0;
                    continue;
                }

                idle_rounds += 1;
                if idle_rounds > config.max_retries {
                    bail!("Transfer {} stalled after {} retries", transfer_id, config.max_retries);
                }

                match progress {
                    Some(_) => {
                        let mut node = receiver.dispatcher.lock().await;
                        let request = node.engine_mut().request_missing_parts(&transfer_id);
                        match request.instrument(receiver.span.clone()).await {
                            Ok(parts) => component_info!(
                                "sim",
                                "Transfer idle, re-requested {} part(s) (retry {}/{})",
                                parts.len(), idle_rounds, config.max_retries
                            ),
                            Err(e) => component_debug!("sim", "Not retrying {}: {}", transfer_id, e),
                        }
                    }
                    None => {
                        // The offer never arrived: withdraw it and offer again
                        let mut node = sender.dispatcher.lock().await;
                        let engine = node.engine_mut();
                        if let Err(e) = engine.cancel(&transfer_id).instrument(sender.span.clone()).await {
                            component_debug!("sim", "Not cancelling {}: {}", transfer_id, e);
                        }
                        transfer_id = engine
                            .offer_file(peer, file_name.clone(), data.clone())
                            .instrument(sender.span.clone())
                            .await?;
                        component_warn!("sim", "No answer to the offer, offered again as {}", transfer_id);
                    }
                }
            },
            _ = &mut deadline => {
                bail!("Transfer {} did not finish within {}", transfer_id, args.timeout);
            },
            _ = tokio::signal::ctrl_c() => {
                bail!("Interrupted");
            },
        }
    };

    if blob != data {
        bail!("Reassembled file differs from {:?}", args.file);
    }
    tokio::fs::write(&args.output, &blob)
        .await
        .with_context(|| format!("writing {:?}", args.output))?;
    component_info!("sim", "Wrote {} bytes to {:?}", blob.len(), args.output);

    // Give the Completed message and the last acks a moment to land
    let settle = tokio::time::sleep(retry_interval.min(Duration::from_millis(500)));
    tokio::pin!(settle);
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if let EngineEvent::Packet(_) = event {
                    packets_seen += 1;
                }
            },
            _ = &mut settle => break,
        }
    }

    report(&sender, &receiver, &sender_store, &transfer_id, packets_seen).await?;
    Ok(())
}

/// Log final transfer state and counters for both nodes
async fn report(
    sender: &SimNode,
    receiver: &SimNode,
    sender_store: &Arc<dyn MessageStore>,
    transfer_id: &TransferId,
    packets_seen: u64,
) -> Result<()> {
    for (role, node) in [("sender", sender), ("receiver", receiver)] {
        let dispatcher = node.dispatcher.lock().await;
        let engine = dispatcher.engine();
        let status = engine
            .transfer(transfer_id)
            .map(|t| t.status().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let stats = engine.stats();
        let link = node.link.stats();

        component_info!(
            "report",
            "{} {}: transfer {}, parts sent={} received={} duplicate={}, send failures={}",
            role,
            node.id,
            status,
            stats.parts_sent,
            stats.parts_received,
            stats.duplicate_parts,
            stats.send_failures
        );
        component_info!(
            "report",
            "{} link: packets sent={} dropped={} duplicated={}",
            role,
            link.sent.load(Ordering::Relaxed),
            link.dropped.load(Ordering::Relaxed),
            link.duplicated.load(Ordering::Relaxed)
        );
    }
    component_info!("report", "Receiver saw {} packets", packets_seen);

    for message in sender_store.list().await? {
        let state = if message.is_delivered() {
            "delivered"
        } else if message.is_failed() {
            "failed"
        } else {
            "pending"
        };
        component_info!("report", "Message {} to {}: {} ({})", message.id, message.to, message.text, state);
    }

    Ok(())
}
