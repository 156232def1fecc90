pub mod codec;
pub mod receiver;
pub mod sender;

pub use codec::{OscBundle, OscError, OscMessage, OscPacket, OscType, decode, encode, encode_message};
pub use receiver::{OscHandler, OscReceiver};
pub use sender::{Delivery, OscSender, PacketSink, UdpSink};
