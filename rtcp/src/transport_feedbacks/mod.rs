//! Transport layer feedback messages, RTCP packet type 205 (RTPFB).

pub mod temporary_max_bitrate;
pub mod transport_layer_cc;
pub mod transport_layer_nack;
