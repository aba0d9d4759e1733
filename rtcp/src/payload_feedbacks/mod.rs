//! Payload specific feedback messages, RTCP packet type 206 (PSFB).

pub mod full_intra_request;
pub mod picture_loss_indication;
pub mod receiver_estimated_maximum_bitrate;
pub mod temporal_spatial_trade_off;
