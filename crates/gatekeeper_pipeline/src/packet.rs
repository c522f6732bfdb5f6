/// The decoded-packet families the pipeline routes (spec §4.8). The codec
/// collaborator is responsible for everything upstream of this enum
/// (framing, encryption, field decoding).
#[derive(Debug, Clone)]
pub enum InboundPacket {
    Position {
        x: f64,
        y: f64,
        z: f64,
        yaw: f64,
        pitch: f64,
        on_ground: bool,
    },
    Interaction,
    Jump,
    Crouch,
    ClientBrand {
        brand: String,
    },
    Chat {
        message: String,
    },
    /// Anything the pipeline doesn't specifically route, but still counts
    /// against the packet-rate and packet-size limiters.
    Other,
}
