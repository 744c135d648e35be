//! The scan loop
//!
//! [`Hub::tick`] is called repeatedly from a single cooperative task. Each
//! pass it:
//! - samples every slot for insertion, silence and due timers
//! - applies queued host requests
//! - drains the frame queue, advancing the lifecycle and syncing values
//! - flushes throttled host notifications
//!
//! Nothing here blocks beyond a transport write and the short mapping
//! table lock.

mod listing;

pub use listing::write_listing;

use embassy_sync::blocking_mutex::raw::RawMutex;
use picontrol_hal::{ByteChannel, FlashStorage};
use picontrol_protocol::command::PING_MAGIC;
use picontrol_protocol::mapping::decode_records;
use picontrol_protocol::{
    CommandId, DataType, Frame, ModuleDescriptor, Parameter, Request, Response, Status,
    ValueRange,
};

use crate::config::{store, HubSettings, ParamCache, PortConfigData, StoreError};
use crate::host::{HubEvent, ModuleRequest, Target};
use crate::link::SlotFrame;
use crate::mapping::{with_mappings, MappingEngine, MappingKey, ValueContext};
use crate::port::{PortManager, SlotId, SLOT_COUNT};
use crate::scheduler::TimerId;
use crate::shared::HubShared;
use crate::sync::{DeliveryMode, Intake, NotifyThrottle, SlotSync};
use crate::traits::{Backplane, HostLink, OutputSink};

/// Scan-loop state of the hub
pub struct Hub<'a, M: RawMutex> {
    settings: HubSettings,
    shared: &'a HubShared<M>,
    ports: PortManager,
    sync: [SlotSync; SLOT_COUNT],
    throttle: NotifyThrottle,
    port_config: PortConfigData,
    params: ParamCache,
    config_dirty: bool,
    params_dirty: bool,
}

impl<'a, M: RawMutex> Hub<'a, M> {
    pub fn new(settings: HubSettings, shared: &'a HubShared<M>) -> Self {
        Self {
            settings,
            shared,
            ports: PortManager::new(&settings),
            sync: core::array::from_fn(|_| SlotSync::new()),
            throttle: NotifyThrottle::new(settings.notify_throttle_ms),
            port_config: PortConfigData::new(),
            params: ParamCache::new(),
            config_dirty: false,
            params_dirty: false,
        }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn ports(&self) -> &PortManager {
        &self.ports
    }

    pub fn sync(&self, slot: SlotId) -> &SlotSync {
        &self.sync[slot.index()]
    }

    pub fn port_config(&self) -> &PortConfigData {
        &self.port_config
    }

    pub fn param_cache(&self) -> &ParamCache {
        &self.params
    }

    /// Port configuration or parameter cache changed since the last save
    pub fn needs_persist(&self) -> bool {
        self.config_dirty || self.params_dirty
    }

    /// Load persisted configuration
    ///
    /// Port configuration and the parameter cache fall back to defaults. A
    /// mapping table that fails to load leaves the current one in place.
    pub async fn restore<F: FlashStorage>(&mut self, storage: &mut F) {
        self.port_config = store::load_port_config(storage).await;
        self.params = store::load_param_cache(storage).await;
        for slot in SlotId::all() {
            let rotated = self.port_config.rotated(slot);
            self.ports.get_mut(slot).set_rotated_180(rotated);
        }

        match store::load_mappings(storage).await {
            Ok(table) => with_mappings(&self.shared.mappings, |current| *current = table),
            Err(e) => warn!("keeping current mappings: {:?}", e),
        }
    }

    /// Save whatever changed since the last call
    pub async fn persist<F: FlashStorage>(&mut self, storage: &mut F) -> Result<(), StoreError> {
        if self.config_dirty {
            store::save_port_config(storage, &mut self.port_config)
                .await
                .inspect_err(|e| error!("port configuration not saved: {:?}", e))?;
            self.config_dirty = false;
        }
        if self.params_dirty {
            store::save_param_cache(storage, &mut self.params)
                .await
                .inspect_err(|e| error!("parameter cache not saved: {:?}", e))?;
            self.params_dirty = false;
        }
        Ok(())
    }

    /// Run one scan pass
    pub fn tick<B, S, H>(&mut self, now_ms: u32, backplane: &mut B, output: &mut S, host: &mut H)
    where
        B: Backplane,
        S: OutputSink,
        H: HostLink,
    {
        for slot in SlotId::all().filter(|s| s.is_populated()) {
            self.scan_slot(slot, now_ms, backplane, host);
        }

        self.apply_requests(now_ms, backplane, host);

        while let Some(SlotFrame { slot, frame }) = self.shared.frames.pop() {
            self.handle_frame(slot, &frame, now_ms, backplane, output, host);
        }

        self.throttle.sweep(now_ms, |slot, param_id, value| {
            notify(
                host,
                HubEvent::ParamChanged {
                    slot,
                    param_id,
                    value,
                },
            )
        });
    }

    fn scan_slot<B: Backplane, H: HostLink>(
        &mut self,
        slot: SlotId,
        now_ms: u32,
        backplane: &mut B,
        host: &mut H,
    ) {
        let lines = backplane.lines(slot);

        if !self.ports.get(slot).is_configured() {
            if !self.ports.sense(slot, lines, now_ms) {
                return;
            }
            if !self.attach(slot, now_ms, backplane) {
                return;
            }
        }

        let liveness = self.shared.liveness(slot);
        if lines.rx_idle() {
            liveness.record_idle(now_ms);
        }
        if liveness.is_silent(now_ms, self.settings.response_timeout_ms) {
            self.remove(slot, now_ms, backplane, host);
            return;
        }

        if let Some(request_id) = self.ports.next_properties_request(slot, now_ms) {
            debug!("slot {},{} GetProperties #{}", slot.row(), slot.col(), request_id);
            send(backplane, slot, &Request::GetProperties { request_id });
        }

        if self.ports.ping_due(slot, now_ms) {
            send(backplane, slot, &Request::Ping);
        }

        let port = self.ports.get_mut(slot);
        if !port.is_ready() {
            return;
        }
        let sync = &mut self.sync[slot.index()];

        if sync.mode() == DeliveryMode::Poll && port.timers_mut().fire(TimerId::Poll, now_ms) {
            if let Some(param_id) = port.module().and_then(|m| sync.next_poll(m)) {
                send(backplane, slot, &Request::GetParameter { param_id });
            }
        }

        for param_id in sync.due_confirmations(now_ms, self.settings.confirm_delay_ms) {
            send(backplane, slot, &Request::GetParameter { param_id });
        }
    }

    /// Bind the transport of a newly detected slot
    fn attach<B: Backplane>(&mut self, slot: SlotId, now_ms: u32, backplane: &mut B) -> bool {
        let opened = match backplane.channel(slot) {
            Some(channel) => channel.open().is_ok(),
            None => false,
        };
        if !opened {
            warn!("slot {},{} transport did not open", slot.row(), slot.col());
            self.ports.detach(slot);
            return false;
        }

        self.shared.liveness(slot).reset(now_ms);
        self.sync[slot.index()].reset();
        let rotated = self.port_config.rotated(slot);
        self.ports.get_mut(slot).set_rotated_180(rotated);
        self.ports.transport_opened(slot);
        true
    }

    /// Forget everything about the module in `slot`
    fn remove<B: Backplane, H: HostLink>(
        &mut self,
        slot: SlotId,
        now_ms: u32,
        backplane: &mut B,
        host: &mut H,
    ) {
        if let Some(channel) = backplane.channel(slot) {
            channel.close();
        }
        let had_module = self.ports.detach(slot);
        let cleared = with_mappings(&self.shared.mappings, |table| table.clear_slot(slot));
        if cleared > 0 {
            debug!("slot {},{} dropped {} mappings", slot.row(), slot.col(), cleared);
        }
        self.sync[slot.index()].reset();
        self.throttle.clear_slot(slot);
        self.shared.liveness(slot).reset(now_ms);

        if had_module {
            notify(host, HubEvent::ModuleRemoved { slot });
        }
    }

    fn apply_requests<B: Backplane, H: HostLink>(
        &mut self,
        now_ms: u32,
        backplane: &mut B,
        host: &mut H,
    ) {
        let shared = self.shared;
        let requests = &shared.requests;

        while let Some(request) = requests.autoupdate.pop() {
            let mode = if request.enable {
                DeliveryMode::Push
            } else {
                DeliveryMode::Poll
            };
            for slot in self.configured(request.target) {
                send(
                    backplane,
                    slot,
                    &Request::SetAutoupdate {
                        enable: request.enable,
                        interval_ms: request.interval_ms,
                    },
                );
                self.sync[slot.index()].set_mode(mode);
            }
        }

        while let Some(request) = requests.rotation.pop() {
            for slot in self.configured(request.target) {
                self.ports.get_mut(slot).set_rotated_180(request.rotated_180);
                if self.port_config.set_rotated(slot, request.rotated_180) {
                    self.config_dirty = true;
                }
            }
        }

        while let Some(request) = requests.parameters.pop() {
            let slot = request.slot;
            let Some(param) = self.ready_parameter(slot, request.param_id) else {
                continue;
            };
            if param.data_type != request.value.data_type() {
                warn!(
                    "slot {},{} param {} is not {:?}",
                    slot.row(),
                    slot.col(),
                    request.param_id,
                    request.value.data_type()
                );
                continue;
            }
            let writable = param.access.writable();

            send(
                backplane,
                slot,
                &Request::SetParameter {
                    param_id: request.param_id,
                    value: request.value,
                },
            );
            if writable {
                if self.params.set(slot, request.param_id, &request.value) {
                    self.params_dirty = true;
                } else {
                    warn!("parameter cache full");
                }
            }
            self.sync[slot.index()].schedule_confirmation(request.param_id, now_ms);
        }

        while let Some(request) = requests.calibration.pop() {
            let slot = request.slot;
            let Some(param) = self.ready_parameter_mut(slot, request.param_id) else {
                continue;
            };
            match param.data_type {
                DataType::Int32 => {
                    param.range = Some(ValueRange::Int32 {
                        min: request.min,
                        max: request.max,
                    })
                }
                DataType::Float32 => {
                    param.range = Some(ValueRange::Float32 {
                        min: request.min as f32,
                        max: request.max as f32,
                    })
                }
                DataType::Bool | DataType::Led => {}
            }
            send(
                backplane,
                slot,
                &Request::SetCalibration {
                    param_id: request.param_id,
                    min: request.min,
                    max: request.max,
                },
            );
        }

        while let Some(target) = requests.mapping_resync.pop() {
            if !self.settings.module_resident_mappings {
                continue;
            }
            for slot in SlotId::all().filter(|s| target.includes(*s)) {
                if !self.ports.get(slot).is_ready() {
                    continue;
                }
                let records = with_mappings(&self.shared.mappings, |table| table.slot_records(slot));
                send(backplane, slot, &Request::SetMappings { records });
            }
        }

        while let Some(request) = requests.modules.pop() {
            match request {
                ModuleRequest::List => {
                    if write_listing(host, &self.ports).is_err() {
                        warn!("module listing truncated");
                    }
                }
                ModuleRequest::Reset(slot) if self.ports.get(slot).is_ready() => {
                    info!("slot {},{} reset requested", slot.row(), slot.col());
                    send(backplane, slot, &Request::ResetModule);
                }
                ModuleRequest::Reset(slot) => {
                    debug!("slot {},{} not ready, reset ignored", slot.row(), slot.col());
                }
            }
        }
    }

    /// Configured slots addressed by `target`
    fn configured(&self, target: Target) -> heapless::Vec<SlotId, SLOT_COUNT> {
        SlotId::all()
            .filter(|s| target.includes(*s) && self.ports.get(*s).is_configured())
            .collect()
    }

    fn ready_parameter(&self, slot: SlotId, param_id: u8) -> Option<&Parameter> {
        let param = self.ports.get(slot).module()?.parameter(param_id);
        if param.is_none() {
            debug!("slot {},{} has no parameter {}", slot.row(), slot.col(), param_id);
        }
        param
    }

    fn ready_parameter_mut(
        &mut self,
        slot: SlotId,
        param_id: u8,
    ) -> Option<&mut Parameter> {
        self.ports.get_mut(slot).module_mut()?.parameter_mut(param_id)
    }

    fn handle_frame<B, S, H>(
        &mut self,
        slot: SlotId,
        frame: &Frame,
        now_ms: u32,
        backplane: &mut B,
        output: &mut S,
        host: &mut H,
    ) where
        B: Backplane,
        S: OutputSink,
        H: HostLink,
    {
        if !self.ports.get(slot).is_configured() {
            trace!("slot {},{} frame after removal", slot.row(), slot.col());
            return;
        }

        match frame.command {
            CommandId::Response => {}
            CommandId::Ping => {
                reply(backplane, slot, Status::Ok, CommandId::Ping, &[PING_MAGIC]);
                return;
            }
            other => {
                reply(backplane, slot, Status::Unsupported, other, &[]);
                return;
            }
        }

        let Ok(response) = Response::from_frame(frame) else {
            debug!("slot {},{} malformed response", slot.row(), slot.col());
            return;
        };
        if response.status != Status::Ok {
            debug!(
                "slot {},{} {:?} answered {:?}",
                slot.row(),
                slot.col(),
                response.in_response_to,
                response.status
            );
            return;
        }

        match response.in_response_to {
            CommandId::GetProperties => match ModuleDescriptor::decode(response.payload) {
                Ok((_, descriptor)) => {
                    if self.ports.accept_descriptor(slot, descriptor, now_ms) {
                        self.on_ready(slot, now_ms, backplane, host);
                    }
                }
                Err(e) => debug!("slot {},{} bad descriptor: {:?}", slot.row(), slot.col(), e),
            },
            CommandId::GetParameter => {
                self.on_parameter(slot, response.payload, now_ms, backplane, output, host)
            }
            CommandId::GetMappings => match decode_records(response.payload) {
                Ok(records) => {
                    let stored = with_mappings(&self.shared.mappings, |table| {
                        table.replace_slot(slot, &records)
                    });
                    debug!("slot {},{} reported {} mappings", slot.row(), slot.col(), stored);
                }
                Err(e) => debug!("slot {},{} bad mappings: {:?}", slot.row(), slot.col(), e),
            },
            _ => {}
        }
    }

    /// Handshake completed
    fn on_ready<B: Backplane, H: HostLink>(
        &mut self,
        slot: SlotId,
        now_ms: u32,
        backplane: &mut B,
        host: &mut H,
    ) {
        notify(host, HubEvent::ModuleReady { slot });

        let Some(module) = self.ports.get(slot).module() else {
            return;
        };
        let sync = &mut self.sync[slot.index()];
        sync.reset();

        if module.capabilities.autoupdate() {
            sync.set_mode(DeliveryMode::Push);
            send(
                backplane,
                slot,
                &Request::SetAutoupdate {
                    enable: true,
                    interval_ms: self.settings.autoupdate_interval_ms,
                },
            );
        }

        for param in module.parameters.iter().filter(|p| p.access.writable()) {
            if let Some(value) = self.params.get(slot, param.id, param.data_type) {
                debug!("slot {},{} restoring param {}", slot.row(), slot.col(), param.id);
                send(
                    backplane,
                    slot,
                    &Request::SetParameter {
                        param_id: param.id,
                        value,
                    },
                );
                sync.schedule_confirmation(param.id, now_ms);
            }
        }

        if self.settings.module_resident_mappings {
            send(backplane, slot, &Request::GetMappings);
        }
    }

    /// Value intake for a `GetParameter` answer, polled or pushed
    fn on_parameter<B, S, H>(
        &mut self,
        slot: SlotId,
        payload: &[u8],
        now_ms: u32,
        backplane: &mut B,
        output: &mut S,
        host: &mut H,
    ) where
        B: Backplane,
        S: OutputSink,
        H: HostLink,
    {
        let Some((&param_id, bytes)) = payload.split_first() else {
            return;
        };
        let port = self.ports.get(slot);
        let flip = port.flips_values();
        let Some(param) = port.module().and_then(|m| m.parameter(param_id)) else {
            debug!("slot {},{} unknown param {}", slot.row(), slot.col(), param_id);
            return;
        };
        let range = param.range;

        match self.sync[slot.index()].intake(param, bytes) {
            Intake::Rejected => {
                debug!("slot {},{} param {} short value", slot.row(), slot.col(), param_id);
            }
            Intake::Unchanged => {}
            Intake::OutOfRange { value, min, max } => {
                warn!(
                    "slot {},{} param {} out of range, resetting to min",
                    slot.row(),
                    slot.col(),
                    param_id
                );
                notify(
                    host,
                    HubEvent::ParamOutOfRange {
                        slot,
                        param_id,
                        value,
                        min,
                        max,
                    },
                );
                send(
                    backplane,
                    slot,
                    &Request::SetParameter {
                        param_id,
                        value: min,
                    },
                );
            }
            Intake::Changed { value, previous } => {
                if let Some(param) = self.ready_parameter_mut(slot, param_id) {
                    param.value = value;
                }

                let key = MappingKey::new(slot, param_id);
                let context = ValueContext {
                    range: range.as_ref(),
                    flip,
                };
                let action = with_mappings(&self.shared.mappings, |table| {
                    MappingEngine::evaluate(table, &key, context, &value, previous.as_ref())
                });
                if let Some(action) = action {
                    MappingEngine::dispatch(action, output);
                }

                if self.throttle.observe(slot, param_id, value, now_ms) {
                    notify(
                        host,
                        HubEvent::ParamChanged {
                            slot,
                            param_id,
                            value,
                        },
                    );
                }
            }
        }
    }
}

fn notify<H: HostLink>(host: &mut H, event: HubEvent) {
    if host.event(&event).is_err() {
        warn!("host event dropped");
    }
}

/// Encode and transmit a request; failures are logged and dropped
fn send<B: Backplane>(backplane: &mut B, slot: SlotId, request: &Request) -> bool {
    match request.to_frame() {
        Ok(frame) => send_frame(backplane, slot, &frame),
        Err(e) => {
            warn!(
                "slot {},{} cannot encode {:?}: {:?}",
                slot.row(),
                slot.col(),
                request.command(),
                e
            );
            false
        }
    }
}

fn reply<B: Backplane>(
    backplane: &mut B,
    slot: SlotId,
    status: Status,
    in_response_to: CommandId,
    payload: &[u8],
) -> bool {
    let response = Response {
        status,
        in_response_to,
        payload,
    };
    match response.to_frame() {
        Ok(frame) => send_frame(backplane, slot, &frame),
        Err(_) => false,
    }
}

fn send_frame<B: Backplane>(backplane: &mut B, slot: SlotId, frame: &Frame) -> bool {
    let Some(channel) = backplane.channel(slot) else {
        return false;
    };
    if !channel.is_open() {
        return false;
    }
    if channel.write_blocking(&frame.to_bytes()).is_err() {
        warn!("slot {},{} write failed", slot.row(), slot.col());
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CalibrationRequest, ParameterRequest, RotationRequest};
    use crate::mapping::{Action, OutputAction};
    use crate::testing::MemoryStorage;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use picontrol_hal::{Level, LineLevels, StorageKey};
    use picontrol_protocol::mapping::encode_records;
    use picontrol_protocol::{Access, Capabilities, FrameParser, MappingRecord, ParameterValue};
    use std::string::String;
    use std::vec::Vec;

    type Shared = HubShared<CriticalSectionRawMutex>;

    impl HostLink for String {}

    #[derive(Default)]
    struct Recorder(Vec<OutputAction>);

    impl OutputSink for Recorder {
        fn send(&mut self, action: OutputAction) -> bool {
            self.0.push(action);
            true
        }
    }

    #[derive(Default)]
    struct MockChannel {
        open: bool,
        sent: Vec<Frame>,
    }

    impl ByteChannel for MockChannel {
        type Error = ();

        fn open(&mut self) -> Result<(), ()> {
            self.open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn write_blocking(&mut self, data: &[u8]) -> Result<(), ()> {
            let mut parser = FrameParser::new();
            let frame = parser.feed_bytes(data, 0).map_err(|_| ())?.ok_or(())?;
            self.sent.push(frame);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), ()> {
            Ok(())
        }
    }

    struct MockBackplane {
        lines: [LineLevels; SLOT_COUNT],
        channels: [MockChannel; SLOT_COUNT],
    }

    impl MockBackplane {
        fn new() -> Self {
            Self {
                lines: [LineLevels::IDLE_EMPTY; SLOT_COUNT],
                channels: Default::default(),
            }
        }

        fn plug(&mut self, slot: SlotId) {
            self.lines[slot.index()] = LineLevels {
                tx: Level::High,
                rx: Level::Low,
            };
        }

        fn unplug(&mut self, slot: SlotId) {
            self.lines[slot.index()] = LineLevels::IDLE_EMPTY;
        }

        fn sent(&self, slot: SlotId) -> &[Frame] {
            &self.channels[slot.index()].sent
        }

        fn take_sent(&mut self, slot: SlotId) -> Vec<Frame> {
            core::mem::take(&mut self.channels[slot.index()].sent)
        }
    }

    impl Backplane for MockBackplane {
        type Channel = MockChannel;

        fn lines(&mut self, slot: SlotId) -> LineLevels {
            self.lines[slot.index()]
        }

        fn channel(&mut self, slot: SlotId) -> Option<&mut MockChannel> {
            if slot.is_populated() {
                Some(&mut self.channels[slot.index()])
            } else {
                None
            }
        }
    }

    struct Bench<'a> {
        hub: Hub<'a, CriticalSectionRawMutex>,
        shared: &'a Shared,
        backplane: MockBackplane,
        output: Recorder,
        host: String,
        now: u32,
    }

    impl<'a> Bench<'a> {
        fn new(shared: &'a Shared, settings: HubSettings) -> Self {
            Self {
                hub: Hub::new(settings, shared),
                shared,
                backplane: MockBackplane::new(),
                output: Recorder::default(),
                host: String::new(),
                now: 0,
            }
        }

        fn tick_at(&mut self, now: u32) {
            self.now = now;
            self.hub
                .tick(now, &mut self.backplane, &mut self.output, &mut self.host);
        }

        /// Frame from the module, as the receive context would queue it
        fn deliver(&mut self, slot: SlotId, frame: Frame) {
            self.shared.liveness(slot).record_frame(self.now);
            self.shared.frames.push(SlotFrame { slot, frame });
        }

        fn respond(&mut self, slot: SlotId, to: CommandId, payload: &[u8]) {
            let frame = Response {
                status: Status::Ok,
                in_response_to: to,
                payload,
            }
            .to_frame()
            .unwrap();
            self.deliver(slot, frame);
        }

        fn report(&mut self, slot: SlotId, param_id: u8, value: ParameterValue) {
            let mut payload = std::vec![param_id];
            payload.extend_from_slice(&value.to_bytes()[..value.data_type().wire_size()]);
            self.respond(slot, CommandId::GetParameter, &payload);
        }

        /// Plug a module in and complete the handshake
        fn connect(&mut self, slot: SlotId, descriptor: &ModuleDescriptor) {
            self.backplane.plug(slot);
            self.tick_at(self.now);
            self.tick_at(self.now + 10);
            self.respond(slot, CommandId::GetProperties, &descriptor.encode(1));
            self.tick_at(self.now + 5);
        }
    }

    fn slot() -> SlotId {
        SlotId::new(1, 1).unwrap()
    }

    fn fader(capabilities: u8) -> ModuleDescriptor {
        let mut descriptor = ModuleDescriptor {
            capabilities: Capabilities(capabilities),
            ..Default::default()
        };
        descriptor
            .parameters
            .push(Parameter {
                id: 0,
                name: "level".try_into().unwrap(),
                data_type: DataType::Int32,
                access: Access(Access::READ),
                value: ParameterValue::Int32(0),
                range: Some(ValueRange::Int32 { min: 0, max: 1023 }),
            })
            .unwrap();
        descriptor
            .parameters
            .push(Parameter {
                id: 1,
                name: Default::default(),
                data_type: DataType::Bool,
                access: Access(Access::READ | Access::WRITE),
                value: ParameterValue::Bool(false),
                range: None,
            })
            .unwrap();
        descriptor
    }

    fn commands(frames: &[Frame]) -> Vec<CommandId> {
        frames.iter().map(|f| f.command).collect()
    }

    #[test]
    fn test_handshake_to_ready() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.backplane.plug(slot());

        bench.tick_at(0);
        assert!(!bench.hub.ports().get(slot()).is_configured());
        bench.tick_at(10);
        assert!(bench.backplane.channels[slot().index()].open);
        assert_eq!(
            bench.backplane.take_sent(slot()),
            [Request::GetProperties { request_id: 1 }.to_frame().unwrap()]
        );

        bench.respond(slot(), CommandId::GetProperties, &fader(0).encode(1));
        bench.tick_at(20);
        assert!(bench.hub.ports().get(slot()).is_ready());
        assert_eq!(bench.host, "event module_ready r=1 c=1\n");
        assert_eq!(bench.hub.sync(slot()).mode(), DeliveryMode::Poll);

        // Poll mode walks the parameters one per interval
        bench.tick_at(25);
        bench.tick_at(75);
        assert_eq!(
            bench.backplane.take_sent(slot()),
            [
                Request::GetParameter { param_id: 0 }.to_frame().unwrap(),
                Request::GetParameter { param_id: 1 }.to_frame().unwrap(),
            ]
        );
    }

    #[test]
    fn test_autoupdate_module_is_not_polled() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        assert_eq!(bench.hub.sync(slot()).mode(), DeliveryMode::Push);

        let sent = bench.backplane.take_sent(slot());
        assert_eq!(
            sent.last(),
            Some(
                &Request::SetAutoupdate {
                    enable: true,
                    interval_ms: 0
                }
                .to_frame()
                .unwrap()
            )
        );
        bench.tick_at(100);
        bench.tick_at(200);
        assert!(!commands(bench.backplane.sent(slot())).contains(&CommandId::GetParameter));
    }

    #[test]
    fn test_value_change_drives_output_and_event() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        with_mappings(&shared.mappings, |table| {
            table
                .set(
                    MappingKey::new(slot(), 0),
                    Action::MidiCc {
                        channel: 1,
                        controller: 7,
                    },
                )
                .unwrap()
        });
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        bench.host.clear();

        bench.report(slot(), 0, ParameterValue::Int32(1023));
        bench.tick_at(bench.now + 1);
        assert_eq!(bench.host, "event param_changed r=1 c=1 pid=0 value=1023\n");
        assert_eq!(
            bench.output.0,
            [OutputAction::ControlChange {
                channel: 0,
                controller: 7,
                value: 127
            }]
        );
        let module = bench.hub.ports().get(slot()).module().unwrap();
        assert_eq!(module.parameter(0).unwrap().value, ParameterValue::Int32(1023));

        // Same value again is not a change
        bench.report(slot(), 0, ParameterValue::Int32(1023));
        bench.tick_at(bench.now + 200);
        assert_eq!(bench.output.0.len(), 1);
    }

    /// Sink that looks at the mapping table on every send
    struct TableReadingSink<'a> {
        shared: &'a Shared,
        sent: Vec<(OutputAction, usize)>,
    }

    impl OutputSink for TableReadingSink<'_> {
        fn send(&mut self, action: OutputAction) -> bool {
            let mappings = with_mappings(&self.shared.mappings, |table| table.len());
            self.sent.push((action, mappings));
            true
        }
    }

    #[test]
    fn test_output_sent_outside_table_lock() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        with_mappings(&shared.mappings, |table| {
            table
                .set(
                    MappingKey::new(slot(), 0),
                    Action::MidiCc {
                        channel: 1,
                        controller: 7,
                    },
                )
                .unwrap()
        });
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));

        let mut sink = TableReadingSink {
            shared: &shared,
            sent: Vec::new(),
        };
        bench.report(slot(), 0, ParameterValue::Int32(1023));
        bench.now += 1;
        bench
            .hub
            .tick(bench.now, &mut bench.backplane, &mut sink, &mut bench.host);
        assert_eq!(
            sink.sent,
            [(
                OutputAction::ControlChange {
                    channel: 0,
                    controller: 7,
                    value: 127
                },
                1
            )]
        );
    }

    #[test]
    fn test_out_of_range_resets_to_min() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        bench.host.clear();
        bench.backplane.take_sent(slot());

        bench.report(slot(), 0, ParameterValue::Int32(2000));
        bench.tick_at(bench.now + 1);
        assert_eq!(
            bench.host,
            "event param_out_of_range r=1 c=1 pid=0 value=2000 min=0 max=1023\n"
        );
        assert_eq!(
            bench.backplane.take_sent(slot()),
            [Request::SetParameter {
                param_id: 0,
                value: ParameterValue::Int32(0)
            }
            .to_frame()
            .unwrap()]
        );
        assert!(bench.output.0.is_empty());
    }

    #[test]
    fn test_notifications_are_throttled_not_output() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        with_mappings(&shared.mappings, |table| {
            table
                .set(
                    MappingKey::new(slot(), 0),
                    Action::MidiCc {
                        channel: 1,
                        controller: 1,
                    },
                )
                .unwrap()
        });
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        bench.host.clear();
        let start = bench.now;

        for (i, value) in [100, 300, 500].into_iter().enumerate() {
            bench.report(slot(), 0, ParameterValue::Int32(value));
            bench.tick_at(start + i as u32 * 10);
        }
        assert_eq!(bench.output.0.len(), 3);
        assert_eq!(bench.host, "event param_changed r=1 c=1 pid=0 value=100\n");

        // The last value goes out once the burst has settled
        bench.tick_at(start + 120);
        assert_eq!(
            bench.host,
            "event param_changed r=1 c=1 pid=0 value=100\nevent param_changed r=1 c=1 pid=0 value=500\n"
        );
    }

    #[test]
    fn test_silent_slot_is_removed() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        with_mappings(&shared.mappings, |table| {
            table
                .set(MappingKey::new(slot(), 0), Action::MidiModWheel { channel: 1 })
                .unwrap()
        });
        bench.connect(slot(), &fader(0));
        bench.host.clear();
        let ready_at = bench.now;

        bench.backplane.unplug(slot());
        bench.tick_at(ready_at + 400);
        assert!(bench.hub.ports().get(slot()).is_ready());

        bench.tick_at(ready_at + 501);
        let port = bench.hub.ports().get(slot());
        assert!(!port.is_configured());
        assert!(!port.has_module());
        assert!(!bench.backplane.channels[slot().index()].open);
        assert_eq!(bench.host, "event module_removed r=1 c=1\n");
        assert!(with_mappings(&shared.mappings, |table| table.is_empty()));
    }

    #[test]
    fn test_idle_line_keeps_slow_module() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(0));

        // A quiet module still holds its receive line idle
        bench.backplane.lines[slot().index()] = LineLevels {
            tx: Level::High,
            rx: Level::High,
        };
        for now in (bench.now..bench.now + 2000).step_by(100) {
            bench.tick_at(now);
        }
        assert!(bench.hub.ports().get(slot()).is_ready());
    }

    #[test]
    fn test_unanswered_handshake_stays_awaiting() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.backplane.plug(slot());
        bench.tick_at(0);
        bench.tick_at(10);
        // Idle receive line keeps the silent module attached
        bench.backplane.lines[slot().index()].rx = Level::High;

        for now in (20..3000).step_by(10) {
            bench.tick_at(now);
        }
        let port = bench.hub.ports().get(slot());
        assert!(port.is_configured());
        assert!(!port.is_ready());
        let requests = commands(bench.backplane.sent(slot()));
        assert_eq!(requests.len(), 10);
        assert!(requests.iter().all(|c| *c == CommandId::GetProperties));
    }

    #[test]
    fn test_module_ping_is_answered() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        bench.backplane.take_sent(slot());

        bench.deliver(slot(), Frame::new(CommandId::Ping, &[PING_MAGIC]).unwrap());
        bench.deliver(slot(), Frame::new(CommandId::Unsupported(0x42), &[]).unwrap());
        bench.tick_at(bench.now + 1);

        let sent = bench.backplane.take_sent(slot());
        assert_eq!(
            &sent[0].payload[..],
            &[Status::Ok as u8, 0x00, 1, 0, PING_MAGIC]
        );
        assert_eq!(&sent[1].payload[..], &[Status::Unsupported as u8, 0x42, 0, 0]);
    }

    #[test]
    fn test_param_write_confirms_and_caches() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        bench.backplane.take_sent(slot());
        let start = bench.now;

        shared
            .requests
            .parameters
            .push(ParameterRequest {
                slot: slot(),
                param_id: 1,
                value: ParameterValue::Bool(true),
            })
            .unwrap();
        bench.tick_at(start);
        assert_eq!(
            bench.backplane.take_sent(slot()),
            [Request::SetParameter {
                param_id: 1,
                value: ParameterValue::Bool(true)
            }
            .to_frame()
            .unwrap()]
        );
        assert!(bench.hub.needs_persist());
        assert_eq!(
            bench.hub.param_cache().get(slot(), 1, DataType::Bool),
            Some(ParameterValue::Bool(true))
        );

        bench.tick_at(start + 10);
        assert!(bench.backplane.sent(slot()).is_empty());
        bench.tick_at(start + 20);
        assert_eq!(
            bench.backplane.take_sent(slot()),
            [Request::GetParameter { param_id: 1 }.to_frame().unwrap()]
        );
    }

    #[test]
    fn test_read_only_write_not_cached() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));

        for (param_id, value) in [(0, ParameterValue::Int32(5)), (1, ParameterValue::Int32(5))] {
            shared
                .requests
                .parameters
                .push(ParameterRequest {
                    slot: slot(),
                    param_id,
                    value,
                })
                .unwrap();
        }
        bench.tick_at(bench.now + 1);
        // Parameter 1 is Bool, so only the first write goes out
        let sent = commands(&bench.backplane.take_sent(slot()));
        assert_eq!(
            sent.iter().filter(|c| **c == CommandId::SetParameter).count(),
            1
        );
        assert!(bench.hub.param_cache().is_empty());
        assert!(!bench.hub.needs_persist());
    }

    #[test]
    fn test_cached_value_replayed_on_ready() {
        let shared = Shared::new();
        let mut storage = MemoryStorage::default();
        let mut cache = ParamCache::new();
        cache.set(slot(), 1, &ParameterValue::Bool(true));
        block_on(store::save_param_cache(&mut storage, &mut cache)).unwrap();

        let mut bench = Bench::new(&shared, HubSettings::default());
        block_on(bench.hub.restore(&mut storage));
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));

        assert!(bench.backplane.sent(slot()).contains(
            &Request::SetParameter {
                param_id: 1,
                value: ParameterValue::Bool(true)
            }
            .to_frame()
            .unwrap()
        ));
    }

    #[test]
    fn test_rotation_is_persisted() {
        let shared = Shared::new();
        let mut storage = MemoryStorage::default();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(Capabilities::ROTATION_AWARE));

        shared
            .requests
            .rotation
            .push(RotationRequest {
                target: Target::All,
                rotated_180: true,
            })
            .unwrap();
        bench.tick_at(bench.now + 1);
        assert!(bench.hub.ports().get(slot()).flips_values());
        assert!(bench.hub.needs_persist());

        block_on(bench.hub.persist(&mut storage)).unwrap();
        assert!(!bench.hub.needs_persist());
        assert!(storage.get(StorageKey::PortConfig).is_some());

        let other = Shared::new();
        let mut fresh = Hub::new(HubSettings::default(), &other);
        block_on(fresh.restore(&mut storage));
        assert!(fresh.port_config().rotated(slot()));
        // Unconfigured slots are left alone
        assert!(!fresh.port_config().rotated(SlotId::new(2, 2).unwrap()));
    }

    #[test]
    fn test_calibration_updates_range() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        bench.backplane.take_sent(slot());

        shared
            .requests
            .calibration
            .push(CalibrationRequest {
                slot: slot(),
                param_id: 0,
                min: 100,
                max: 900,
            })
            .unwrap();
        bench.tick_at(bench.now + 1);
        assert_eq!(
            bench.backplane.take_sent(slot()),
            [Request::SetCalibration {
                param_id: 0,
                min: 100,
                max: 900
            }
            .to_frame()
            .unwrap()]
        );
        let module = bench.hub.ports().get(slot()).module().unwrap();
        assert_eq!(
            module.parameter(0).unwrap().range,
            Some(ValueRange::Int32 { min: 100, max: 900 })
        );
    }

    #[test]
    fn test_module_resident_mappings() {
        let shared = Shared::new();
        let settings = HubSettings {
            module_resident_mappings: true,
            ..Default::default()
        };
        let mut bench = Bench::new(&shared, settings);
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        assert_eq!(
            commands(bench.backplane.sent(slot())).last(),
            Some(&CommandId::GetMappings)
        );

        let record = MappingRecord {
            param_id: 0,
            action_type: 2,
            target: [1, 74, 0],
            ..Default::default()
        };
        let payload = encode_records(&[record]).unwrap();
        bench.respond(slot(), CommandId::GetMappings, &payload);
        bench.tick_at(bench.now + 1);
        let action = with_mappings(&shared.mappings, |table| {
            table.get(&MappingKey::new(slot(), 0)).map(|m| m.action)
        });
        assert_eq!(
            action,
            Some(Action::MidiCc {
                channel: 1,
                controller: 74
            })
        );

        bench.backplane.take_sent(slot());
        shared
            .requests
            .mapping_resync
            .push(Target::Slot(slot()))
            .unwrap();
        bench.tick_at(bench.now + 1);
        assert_eq!(
            commands(&bench.backplane.take_sent(slot())),
            [CommandId::SetMappings]
        );
    }

    #[test]
    fn test_module_list_and_reset() {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(Capabilities::AUTOUPDATE));
        bench.host.clear();
        bench.backplane.take_sent(slot());

        shared.requests.modules.push(ModuleRequest::List).unwrap();
        shared
            .requests
            .modules
            .push(ModuleRequest::Reset(slot()))
            .unwrap();
        bench.tick_at(bench.now + 1);

        assert!(bench.host.starts_with("ok ports rows=3 cols=3\n"));
        assert!(bench.host.contains("port r=1 c=1 configured=1 hasModule=1"));
        assert!(bench.host.ends_with("ok modules done\n"));
        assert_eq!(
            bench.backplane.take_sent(slot()),
            [Request::ResetModule.to_frame().unwrap()]
        );
    }

    #[test]
    fn test_console_to_scan_loop() {
        let shared = Shared::new();
        let mut storage = MemoryStorage::default();
        let mut bench = Bench::new(&shared, HubSettings::default());
        bench.connect(slot(), &fader(0));

        let mut reply = String::new();
        block_on(crate::host::execute(
            "autoupdate set 1 1 1 25",
            &shared,
            &mut storage,
            &mut reply,
        ))
        .unwrap();
        assert_eq!(reply, "ok queued\n");

        bench.tick_at(bench.now + 1);
        assert_eq!(bench.hub.sync(slot()).mode(), DeliveryMode::Push);
        assert_eq!(
            bench.backplane.take_sent(slot()).last(),
            Some(
                &Request::SetAutoupdate {
                    enable: true,
                    interval_ms: 25
                }
                .to_frame()
                .unwrap()
            )
        );

        bench.tick_at(bench.now + 100);
        assert!(!commands(bench.backplane.sent(slot())).contains(&CommandId::GetParameter));
    }
}
