use colored::*;
use wpan_frame::{
    validate_frame, Address, AddressingFields, BeaconPayload, Command, Error, FrameControl,
    FrameType, FrameVersion, Payload,
};

struct Writer<'b> {
    buffer: &'b mut String,
    indent: usize,
}

impl<'b> Writer<'b> {
    fn new(buffer: &'b mut String) -> Self {
        Self { buffer, indent: 0 }
    }

    fn increase_indent(&mut self) {
        self.indent += 2;
    }

    fn decrease_indent(&mut self) {
        self.indent -= 2;
    }

    fn write(&mut self, s: String) {
        self.buffer.push_str(&" ".repeat(self.indent));
        self.buffer.push_str(&s);
    }

    fn writeln(&mut self, s: String) {
        self.write(s);
        self.buffer.push('\n');
    }

    fn section(&mut self, title: &str) {
        self.writeln(title.underline().bold().to_string());
    }

    fn field(&mut self, name: &str, value: impl core::fmt::Display) {
        self.writeln(format!("{}: {}", name.bold(), value));
    }
}

/// Why a frame could not be dissected.
#[derive(Debug, PartialEq)]
pub enum ParseError {
    /// The input is not a hex string.
    Hex(hex::FromHexError),
    /// The frame does not pass validation.
    Frame(Error),
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Hex(err) => write!(f, "invalid hex input: {err}"),
            Self::Frame(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<hex::FromHexError> for ParseError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Hex(err)
    }
}

impl From<Error> for ParseError {
    fn from(err: Error) -> Self {
        Self::Frame(err)
    }
}

pub struct FrameParser {}

impl FrameParser {
    pub fn parse_hex(input: &str) -> Result<String, ParseError> {
        let data = hex::decode(input.trim())?;
        Self::parse(&data)
    }

    /// Dissect a frame without its FCS.
    pub fn parse(input: &[u8]) -> Result<String, ParseError> {
        let mpdu = validate_frame(input)?;
        let mut buffer = String::new();
        let mut w = Writer::new(&mut buffer);

        frame_control(&mut w, &mpdu.frame_control());

        if let Some(seq) = mpdu.sequence_number() {
            w.section("Sequence Number");
            w.increase_indent();
            w.field("sequence number", seq);
            w.decrease_indent();
        }

        addressing(&mut w, &mpdu.addressing());

        if let Some(aux) = mpdu.auxiliary_security_header() {
            w.section("Auxiliary Security Header");
            w.increase_indent();
            w.field("security level", format!("{:?}", aux.security_level()));
            w.field("key id mode", format!("{:?}", aux.key_id_mode()));
            if let Some(counter) = aux.frame_counter() {
                w.field("frame counter", counter);
            }
            if !aux.key_source().is_empty() {
                w.field("key source", format!("{:x?}", aux.key_source()));
            }
            if let Some(index) = aux.key_index() {
                w.field("key index", index);
            }
            w.decrease_indent();
        }

        match mpdu.payload() {
            Payload::Beacon(beacon) => self::beacon(&mut w, beacon),
            Payload::Command(command) => self::command(&mut w, command),
            Payload::Data(data) => {
                w.section("Payload");
                w.increase_indent();
                w.writeln(format!("{:x?}", data));
                w.decrease_indent();
            }
            Payload::Secured(data) => {
                w.section("Secured Payload");
                w.increase_indent();
                w.field("length", data.len());
                w.decrease_indent();
            }
            Payload::Ack => {}
        }

        Ok(buffer)
    }
}

fn frame_control(w: &mut Writer, fc: &FrameControl<&[u8]>) {
    w.section("Frame Control");
    w.increase_indent();
    let enhanced = fc.frame_version() == FrameVersion::Ieee802154_2020
        && matches!(fc.frame_type(), FrameType::Beacon | FrameType::Ack);
    w.field(
        "frame type",
        format!(
            "{}{:?}",
            if enhanced { "Enhanced " } else { "" },
            fc.frame_type()
        )
        .bright_blue(),
    );
    w.field("security", fc.security_enabled() as usize);
    w.field("frame pending", fc.frame_pending() as usize);
    w.field("ack request", fc.ack_request() as usize);
    w.field("pan id compression", fc.pan_id_compression() as usize);
    w.field(
        "sequence number suppression",
        fc.sequence_number_suppression() as usize,
    );
    w.field(
        "information elements present",
        fc.information_elements_present() as usize,
    );
    w.field(
        "dst addressing mode",
        format!("{:?}", fc.dst_addressing_mode()),
    );
    w.field(
        "src addressing mode",
        format!("{:?}", fc.src_addressing_mode()),
    );
    w.field(
        "frame version",
        format!("{} ({:?})", fc.frame_version() as usize, fc.frame_version()),
    );
    w.decrease_indent();
}

fn addressing(w: &mut Writer, addr: &AddressingFields<&[u8]>) {
    if addr.is_empty() {
        return;
    }
    w.section("Addressing");
    w.increase_indent();

    let address = |a: Address| {
        format!(
            "{}{}",
            a,
            if a.is_broadcast() { " (broadcast)" } else { "" }
        )
    };

    if let Some(dst_pan_id) = addr.dst_pan_id() {
        w.field("dst pan id", format!("{:x}", dst_pan_id));
    }
    if !addr.dst_address().is_empty() {
        w.field("dst addr", address(addr.dst_address()));
    }
    if let Some(src_pan_id) = addr.src_pan_id() {
        w.field("src pan id", format!("{:x}", src_pan_id));
    }
    if !addr.src_address().is_empty() {
        w.field("src addr", address(addr.src_address()));
    }
    w.decrease_indent();
}

fn beacon(w: &mut Writer, beacon: &BeaconPayload<&[u8]>) {
    let sf = beacon.superframe_specification();
    w.section("Superframe Specification");
    w.increase_indent();
    w.field("beacon order", format!("{:?}", sf.beacon_order()));
    w.field("superframe order", format!("{:?}", sf.superframe_order()));
    w.field("final cap slot", sf.final_cap_slot());
    w.field(
        "battery life extension",
        sf.battery_life_extension() as usize,
    );
    w.field("pan coordinator", sf.pan_coordinator() as usize);
    w.field("association permit", sf.association_permit() as usize);
    w.decrease_indent();

    w.section("GTS");
    w.increase_indent();
    w.field("permit", beacon.gts_specification().gts_permit() as usize);
    for slot in beacon.gts_slots() {
        w.field(
            "slot",
            format!(
                "{} start {} length {} {:?}",
                slot.address, slot.starting_slot, slot.length, slot.direction
            ),
        );
    }
    w.decrease_indent();

    let pending: Vec<Address> = beacon.pending_addresses().collect();
    if !pending.is_empty() {
        w.section("Pending Addresses");
        w.increase_indent();
        for address in pending {
            w.writeln(address.to_string());
        }
        w.decrease_indent();
    }

    if !beacon.payload().is_empty() {
        w.section("Beacon Payload");
        w.increase_indent();
        w.writeln(format!("{:x?}", beacon.payload()));
        w.decrease_indent();
    }
}

fn command(w: &mut Writer, command: &Command) {
    w.section("MAC Command");
    w.increase_indent();
    w.field("id", format!("{:?}", command.id()).bright_blue());
    match command {
        Command::AssociationRequest(capability) => {
            w.field("capability", format!("{:?}", capability));
        }
        Command::AssociationResponse(response) => {
            w.field("short address", format!("{:04x}", response.short_address()));
            w.field("status", format!("{:?}", response.status()));
        }
        Command::DisassociationNotification(reason) => {
            w.field("reason", format!("{:?}", reason));
        }
        Command::CoordinatorRealignment(realignment) => {
            w.field("pan id", format!("{:04x}", realignment.pan_id()));
            w.field(
                "coordinator short address",
                format!("{:04x}", realignment.coordinator_short_address()),
            );
            w.field("channel", realignment.channel());
            if let Some(page) = realignment.channel_page() {
                w.field("channel page", page);
            }
            w.field(
                "short address",
                format!("{:04x}", realignment.short_address()),
            );
        }
        Command::GtsRequest(gts) => {
            w.field("length", gts.length());
            w.field("receive only", gts.receive_only() as usize);
            w.field("allocation", gts.allocation() as usize);
        }
        Command::DataRequest
        | Command::PanIdConflictNotification
        | Command::OrphanNotification
        | Command::BeaconRequest => {}
    }
    w.decrease_indent();
}
