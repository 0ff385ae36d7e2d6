//! Relay supervisor
//!
//! Opens one capture handle per listen device plus one for the upstream
//! device, spawns a reader task per listen handle and drives the upstream
//! reader itself. Closing the handles is what stops the readers; dropping
//! the server closes them.

use super::device::Device;
use super::engine::Engine;
use super::filter::FrameFilter;
use super::nat::HandleId;
use crate::capture::{AfPacketSocket, Capture, SNAPLEN};
use crate::protocol::{parse_frame, LinkKind};
use crate::telemetry::RelayStats;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

pub struct Server<H: Capture> {
    engine: Arc<Engine<H>>,
    listen_devs: Vec<Device>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server<AfPacketSocket> {
    /// Validate the device set, then bind one socket per listen device and
    /// one for the upstream device
    pub fn open(
        listen_port: u16,
        listen_devs: Vec<Device>,
        updev: Device,
        gateway: Device,
    ) -> Result<Self> {
        validate_devices(listen_port, &listen_devs, &updev, &gateway)?;

        let mut listen_handles = Vec::with_capacity(listen_devs.len());
        for dev in &listen_devs {
            listen_handles.push(AfPacketSocket::open(&dev.name)?);
        }
        let up_handle = AfPacketSocket::open(&updev.name)?;

        Self::with_handles(
            listen_port,
            listen_devs,
            updev,
            gateway,
            listen_handles,
            up_handle,
        )
    }
}

impl<H: Capture> Server<H> {
    /// Assemble a server around already-open handles (one per listen
    /// device, in order)
    pub fn with_handles(
        listen_port: u16,
        listen_devs: Vec<Device>,
        updev: Device,
        gateway: Device,
        listen_handles: Vec<H>,
        up_handle: H,
    ) -> Result<Self> {
        validate_devices(listen_port, &listen_devs, &updev, &gateway)?;

        if listen_handles.len() != listen_devs.len() {
            return Err(Error::Config("one handle per listen device".into()));
        }

        print_banner(&listen_devs, &updev, &gateway);

        let engine = Engine::new(
            listen_port,
            updev,
            gateway,
            listen_handles.into_iter().map(Arc::new).collect(),
            Arc::new(up_handle),
            Arc::new(RelayStats::new()),
        );

        Ok(Self {
            engine: Arc::new(engine),
            listen_devs,
            tasks: Vec::new(),
        })
    }

    pub fn engine(&self) -> &Arc<Engine<H>> {
        &self.engine
    }

    /// Spawn the listen readers and drive the upstream reader until its
    /// handle closes
    pub async fn run(&mut self) -> Result<()> {
        let listen_port = self.engine.listen_port();

        let mut tasks = Vec::with_capacity(self.listen_devs.len());
        for (index, dev) in self.listen_devs.iter().enumerate() {
            let engine = self.engine.clone();
            let handle = self
                .engine
                .listen_handle(index)
                .ok_or_else(|| Error::Config("missing listen handle".into()))?;
            let link = dev.link_kind();
            let name = dev.name.clone();

            tasks.push(tokio::spawn(async move {
                debug!("reader started on {}", name);
                listen_loop(engine, handle, link, HandleId(index), listen_port).await;
                debug!("reader stopped on {}", name);
            }));
        }
        self.tasks.extend(tasks);

        upstream_loop(
            self.engine.clone(),
            self.engine.up_handle(),
            self.engine.updev_link_kind(),
            listen_port,
        )
        .await;

        self.close();
        Ok(())
    }

    /// Stop the listen readers; capture handles close when the engine is
    /// dropped
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<H: Capture> Drop for Server<H> {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_devices(
    listen_port: u16,
    listen_devs: &[Device],
    updev: &Device,
    gateway: &Device,
) -> Result<()> {
    if listen_port == 0 {
        return Err(Error::Config("listen port must be nonzero".into()));
    }
    if listen_devs.is_empty() {
        return Err(Error::Config("missing listen device".into()));
    }
    if updev.ip_addrs.is_empty() {
        return Err(Error::Config("upstream device has no address".into()));
    }
    if gateway.ip_addr().is_none() {
        return Err(Error::Config("missing gateway".into()));
    }
    if !updev.is_loopback && updev.hardware_addr.is_none() {
        return Err(Error::Config("upstream device has no MAC".into()));
    }
    if !updev.is_loopback && gateway.hardware_addr.is_none() {
        return Err(Error::Config("gateway has no MAC".into()));
    }

    Ok(())
}

fn print_banner(listen_devs: &[Device], updev: &Device, gateway: &Device) {
    if listen_devs.len() == 1 {
        info!("listen on {}", listen_devs[0]);
    } else {
        info!("listen on:");
        for dev in listen_devs {
            info!("  {}", dev);
        }
    }

    match (updev.is_loopback, gateway.hardware_addr, gateway.ip_addr()) {
        (true, _, _) => info!("route upstream to loopback {}", updev.friendly_name),
        (false, Some(hw), Some(ip)) => {
            info!("route upstream from {} to gateway [{}]: {}", updev, hw, ip)
        }
        _ => info!("route upstream from {}", updev),
    }
}

async fn listen_loop<H: Capture>(
    engine: Arc<Engine<H>>,
    handle: Arc<H>,
    link: LinkKind,
    id: HandleId,
    listen_port: u16,
) {
    let filter = FrameFilter::Listen { port: listen_port };
    let mut buf = vec![0u8; SNAPLEN];

    loop {
        let info = match handle.recv(&mut buf).await {
            Ok(info) => info,
            // A closed handle is the shutdown signal
            Err(e) => {
                debug!("listen reader: {}", e);
                return;
            }
        };

        if let Some(indicator) = admit(&buf[..info.len], link, &filter) {
            engine.handle_listen(indicator, id).await;
        }
    }
}

async fn upstream_loop<H: Capture>(
    engine: Arc<Engine<H>>,
    handle: Arc<H>,
    link: LinkKind,
    listen_port: u16,
) {
    let filter = FrameFilter::Upstream { port: listen_port };
    let mut buf = vec![0u8; SNAPLEN];

    loop {
        let info = match handle.recv(&mut buf).await {
            Ok(info) => info,
            Err(e) => {
                debug!("upstream reader: {}", e);
                return;
            }
        };

        if let Some(indicator) = admit(&buf[..info.len], link, &filter) {
            engine.handle_upstream(indicator).await;
        }
    }
}

/// Parse and filter one raw frame. Frames a capture filter would never
/// deliver (non-IP, non-TCP/UDP, wrong port) are discarded quietly.
fn admit(
    bytes: &[u8],
    link: LinkKind,
    filter: &FrameFilter,
) -> Option<crate::protocol::PacketIndicator> {
    let indicator = match parse_frame(bytes, link) {
        Ok(ind) => ind,
        Err(e) => {
            trace!("discard frame: {}", e);
            return None;
        }
    };

    filter.matches(&indicator).then_some(indicator)
}
