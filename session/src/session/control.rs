use rtcp::application_defined::ApplicationDefined;
use rtcp::compound_packet::CompoundPacket;
use rtcp::extended_report::ExtendedReport;
use rtcp::goodbye::Goodbye;
use rtcp::packet::Packet as RtcpPacket;
use rtcp::payload_feedbacks::full_intra_request::FullIntraRequest;
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use rtcp::payload_feedbacks::temporal_spatial_trade_off::{
    TemporalSpatialTradeOffNotification, TemporalSpatialTradeOffRequest,
};
use rtcp::raw_packet::RawPacket;
use rtcp::receiver_report::ReceiverReport;
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use rtcp::source_description::{SdesType, SourceDescription};
use rtcp::transport_feedbacks::temporary_max_bitrate::{
    TemporaryMaxBitrateNotification, TemporaryMaxBitrateRequest,
};
use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;

use super::*;

impl SessionInternal {
    /// known_sender checks that feedback names one of our senders.
    fn known_sender(&self, ssrc: u32) -> Option<SourceRef> {
        match self.source(ssrc) {
            Some(s) if s.lock().direction() == Direction::Sender => Some(s),
            _ => {
                log::debug!("{}", Error::UnknownSsrc(ssrc));
                None
            }
        }
    }

    fn on_reception_reports(&self, reports: &[ReceptionReport], now: SystemTime) {
        for report in reports {
            if let Some(sender) = self.known_sender(report.ssrc) {
                sender.lock().on_receive_reception_report(report, now);
            }
        }
    }

    fn on_source_description(&self, sdes: &SourceDescription) {
        for chunk in &sdes.chunks {
            let Some(cname) = chunk.item(SdesType::SdesCname) else {
                continue;
            };
            match self.source(chunk.source) {
                Some(s) => s.lock().set_cname(&String::from_utf8_lossy(cname)),
                None => log::debug!("SDES for {}", Error::UnknownSsrc(chunk.source)),
            }
        }
    }

    fn on_goodbye(&self, bye: &Goodbye) {
        for ssrc in &bye.sources {
            match self.source(*ssrc) {
                Some(s) => {
                    log::debug!("ssrc={:08x} said BYE", ssrc);
                    s.lock().mark_closing();
                }
                None => log::debug!("BYE for {}", Error::UnknownSsrc(*ssrc)),
            }
        }
    }

    /// on_nack resends what history still holds, on the rtx source when
    /// there is one.
    fn on_nack(&self, nack: &TransportLayerNack, now: SystemTime, resend: &mut Vec<Bytes>) {
        let Some(primary) = self.known_sender(nack.media_ssrc) else {
            return;
        };
        let (packets, rtx_ssrc) = {
            let mut p = primary.lock();
            p.on_nack_received();
            let packets: Vec<(Packet, RewriteMode)> = nack
                .packet_list()
                .into_iter()
                .filter_map(|seq| p.take_for_resend(seq))
                .collect();
            (packets, p.rtx_ssrc())
        };
        if packets.is_empty() {
            log::trace!("ssrc={:08x} NACKed packets no longer held", nack.media_ssrc);
            return;
        }

        let source = rtx_ssrc.and_then(|id| self.source(id)).unwrap_or(primary);
        let mut via = source.lock();
        for (mut packet, mode) in packets {
            match via.on_send_data(&mut packet, mode, now) {
                Ok(SendReceiveStatus::ProcessPacket) => resend.push(packet.freeze()),
                Ok(_) => {}
                Err(err) => log::warn!("ssrc={:08x} resend failed: {}", via.ssrc(), err),
            }
        }
    }

    fn on_extended_report(&self, xr: &ExtendedReport, now: SystemTime) {
        if let Some(ntp) = xr.receiver_reference_time() {
            match self.source(xr.sender_ssrc) {
                Some(s) => s.lock().on_receive_rrtr(ntp, now),
                None => log::debug!("RRTR from {}", Error::UnknownSsrc(xr.sender_ssrc)),
            }
        }
        for dlrr in xr.dlrr_reports() {
            if let Some(sender) = self.known_sender(dlrr.ssrc) {
                sender.lock().on_receive_dlrr(dlrr, now);
            }
        }
    }

    /// events_for turns feedback about our senders into control events.
    fn events_for(&self, packet: &(dyn RtcpPacket + Send + Sync), events: &mut Vec<ControlEvent>) {
        let any = packet.as_any();
        if let Some(tmmbr) = any.downcast_ref::<TemporaryMaxBitrateRequest>() {
            for e in &tmmbr.entries {
                if self.known_sender(e.ssrc).is_some() {
                    events.push(ControlEvent::FlowControl {
                        ssrc: e.ssrc,
                        bitrate: e.bitrate,
                        overhead: e.overhead,
                    });
                }
            }
        } else if let Some(tmmbn) = any.downcast_ref::<TemporaryMaxBitrateNotification>() {
            for e in &tmmbn.entries {
                events.push(ControlEvent::FlowControlNotification {
                    ssrc: e.ssrc,
                    bitrate: e.bitrate,
                    overhead: e.overhead,
                });
            }
        } else if let Some(remb) = any.downcast_ref::<ReceiverEstimatedMaximumBitrate>() {
            for ssrc in &remb.ssrcs {
                if self.known_sender(*ssrc).is_some() {
                    events.push(ControlEvent::FlowControl {
                        ssrc: *ssrc,
                        bitrate: remb.bitrate,
                        overhead: 0,
                    });
                }
            }
        } else if let Some(pli) = any.downcast_ref::<PictureLossIndication>() {
            if self.known_sender(pli.media_ssrc).is_some() {
                events.push(ControlEvent::IntraFrameRequest {
                    ssrc: pli.media_ssrc,
                    full: false,
                });
            }
        } else if let Some(fir) = any.downcast_ref::<FullIntraRequest>() {
            for e in &fir.fir {
                if self.known_sender(e.ssrc).is_some() {
                    events.push(ControlEvent::IntraFrameRequest {
                        ssrc: e.ssrc,
                        full: true,
                    });
                }
            }
        } else if let Some(tstr) = any.downcast_ref::<TemporalSpatialTradeOffRequest>() {
            for e in &tstr.entries {
                if self.known_sender(e.ssrc).is_some() {
                    events.push(ControlEvent::TemporalSpatialTradeOff {
                        ssrc: e.ssrc,
                        index: e.index,
                        notification: false,
                    });
                }
            }
        } else if let Some(tstn) = any.downcast_ref::<TemporalSpatialTradeOffNotification>() {
            for e in &tstn.entries {
                events.push(ControlEvent::TemporalSpatialTradeOff {
                    ssrc: e.ssrc,
                    index: e.index,
                    notification: true,
                });
            }
        } else if let Some(tcc) = any.downcast_ref::<TransportLayerCc>() {
            events.push(ControlEvent::TransportCc(tcc.clone()));
        } else if let Some(app) = any.downcast_ref::<ApplicationDefined>() {
            events.push(ControlEvent::Application(app.clone()));
        }
    }

    /// receive_control walks a compound packet as far as it decodes. A bad
    /// sub-packet is logged and its siblings are still handled. Returns the
    /// packets to resend for NACKs.
    pub(crate) fn receive_control(&self, buf: &[u8]) -> (SendReceiveStatus, Vec<Bytes>) {
        let compound = CompoundPacket::from(buf);
        let (packets, errors) = compound.packets();
        for err in &errors {
            log::warn!("invalid rtcp: {}", err);
        }
        if packets.is_empty() {
            return (SendReceiveStatus::IgnorePacket, vec![]);
        }

        let now = self.now();
        let mut events = vec![];
        let mut resend = vec![];
        for packet in packets {
            let any = packet.as_any();
            if let Some(sr) = any.downcast_ref::<SenderReport>() {
                match self.source(sr.ssrc) {
                    Some(r) => r.lock().on_receive_sender_report(sr, now),
                    None => log::debug!("SR from {}", Error::UnknownSsrc(sr.ssrc)),
                }
                self.on_reception_reports(&sr.reports, now);
            } else if let Some(rr) = any.downcast_ref::<ReceiverReport>() {
                self.on_reception_reports(&rr.reports, now);
            } else if let Some(sdes) = any.downcast_ref::<SourceDescription>() {
                self.on_source_description(sdes);
            } else if let Some(bye) = any.downcast_ref::<Goodbye>() {
                self.on_goodbye(bye);
            } else if let Some(nack) = any.downcast_ref::<TransportLayerNack>() {
                if self.config.feedback.contains(Feedback::NACK) {
                    self.on_nack(nack, now, &mut resend);
                }
            } else if let Some(xr) = any.downcast_ref::<ExtendedReport>() {
                self.on_extended_report(xr, now);
            } else if let Some(raw) = any.downcast_ref::<RawPacket>() {
                log::debug!(
                    "{} ({} bytes)",
                    Error::UnsupportedFeedbackType,
                    raw.0.len()
                );
            } else {
                self.events_for(packet.as_ref(), &mut events);
            }
            events.push(ControlEvent::Packet(packet));
        }

        let _dispatch = self.dispatching.read_recursive();
        let notifiers = self.notifiers.read().snapshot();
        for event in &events {
            notifiers.notify_control(event);
        }
        (SendReceiveStatus::ProcessPacket, resend)
    }
}
