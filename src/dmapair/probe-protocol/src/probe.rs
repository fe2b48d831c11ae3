// Edge record streamed to an external logic-analyser view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub line: u8,  // 3-bit debug line index
    pub level: bool,
    pub seq: u32, // 17-bit wrapping sequence number
}

/// Sequence numbers wrap at 17 bits
pub const SEQ_MASK: u32 = 0x1_ffff;

/// Highest line index the packet can carry
pub const MAX_LINE: u8 = 0x7;

impl Edge {
    pub fn new(line: u8, level: bool, seq: u32) -> Self {
        Edge {
            line: line & MAX_LINE,
            level,
            seq: seq & SEQ_MASK,
        }
    }

    /// Decode a packet off the wire; `None` if any position tag is wrong
    pub fn parse(packet: [u8; 4]) -> Option<Self> {
        parse_probe_packet(packet)
    }

    pub fn serialize(&self) -> [u8; 4] {
        generate_probe_packet(self.line, self.level, self.seq)
    }
}

/// Packs an edge as
/// [00 | Line(3) Reserved(3) | 01 | Level Seq(12-16) | 10 | Seq(6-11) | 11 | Seq(0-5)]
pub fn generate_probe_packet(line: u8, level: bool, seq: u32) -> [u8; 4] {
    let header = (line & MAX_LINE) << 3;
    let upper = 0x40 | (level as u8) << 5 | ((seq >> 12) & 0x1F) as u8;
    let middle = 0x80 | ((seq >> 6) & 0x3F) as u8;
    let lower = 0xC0 | (seq & 0x3F) as u8;
    [header, upper, middle, lower]
}

pub fn parse_probe_packet(packet: [u8; 4]) -> Option<Edge> {
    let [b0, b1, b2, b3] = packet;

    let valid = (b0 & 0xC0 == 0x00) &&  // Header: 00
               (b1 & 0xC0 == 0x40) &&  // Upper:  01
               (b2 & 0xC0 == 0x80) &&  // Middle: 10
               (b3 & 0xC0 == 0xC0); // Lower:  11
    if !valid {
        return None;
    }

    let seq = ((b1 as u32 & 0x1F) << 12) | ((b2 as u32 & 0x3F) << 6) | (b3 as u32 & 0x3F);
    Some(Edge {
        line: (b0 >> 3) & MAX_LINE,
        level: b1 & 0x20 != 0,
        seq,
    })
}
