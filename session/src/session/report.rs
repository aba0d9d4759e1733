use rtcp::compound_packet::CompoundPacket;
use rtcp::extended_report::{
    DlrrReportBlock, ExtendedReport, ReceiverReferenceTimeReportBlock, ReportBlock,
};
use rtcp::goodbye::Goodbye;
use rtcp::packet::Packet as RtcpPacket;
use rtcp::payload_feedbacks::full_intra_request::{FirEntry, FullIntraRequest};
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use rtcp::payload_feedbacks::temporal_spatial_trade_off::{
    TemporalSpatialTradeOffRequest, TradeOffEntry,
};
use rtcp::receiver_report::ReceiverReport;
use rtcp::reception_report::ReceptionReport;
use rtcp::source_description::{
    SdesType, SourceDescription, SourceDescriptionChunk, SourceDescriptionItem,
};
use rtcp::transport_feedbacks::temporary_max_bitrate::{TemporaryMaxBitrateRequest, TmmbEntry};
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;

use super::*;

/// An SR or RR carries at most 31 reception reports.
const MAX_REPORTS_PER_PACKET: usize = 31;

fn sdes(ssrc: u32, cname: &str, tool: Option<&str>) -> SourceDescription {
    let mut items = vec![SourceDescriptionItem::new(
        SdesType::SdesCname,
        Bytes::copy_from_slice(cname.as_bytes()),
    )];
    if let Some(tool) = tool {
        items.push(SourceDescriptionItem::new(
            SdesType::SdesTool,
            Bytes::copy_from_slice(tool.as_bytes()),
        ));
    }
    SourceDescription {
        chunks: vec![SourceDescriptionChunk {
            source: ssrc,
            items,
        }],
    }
}

impl SessionInternal {
    /// build_reports assembles one compound packet per sender: SR or RR,
    /// reception reports of our receivers, SDES and XR. Receivers are only
    /// reported in the first compound that gets built.
    pub(crate) fn build_reports(&self, ssrc: u32, force: bool) -> Result<Vec<Bytes>> {
        let now = self.now();
        self.remove_gone(now);

        let senders = if ssrc != 0 {
            let source = self.source(ssrc).ok_or(Error::UnknownSsrc(ssrc))?;
            if source.lock().direction() != Direction::Sender {
                return Err(Error::UnknownSsrc(ssrc));
            }
            vec![source]
        } else {
            let senders = self.sources.read().of_direction(Direction::Sender);
            if senders.is_empty() {
                vec![self.default_sender()?]
            } else {
                senders
            }
        };
        // Receivers are reported in the first compound that gets built, and
        // their interval baselines only move once it exists.
        let mut receivers = Some(self.sources.read().of_direction(Direction::Receiver));

        let mut out = vec![];
        for sender in senders {
            let Some(mut s) = sender.try_lock() else {
                log::trace!("sender busy, skipped in this report");
                continue;
            };

            let mut blocks: Vec<ReceptionReport> = vec![];
            let mut marks = vec![];
            let mut dlrrs = vec![];
            for receiver in receivers.iter().flatten() {
                let Some(r) = receiver.try_lock() else {
                    log::trace!("receiver busy, skipped in this report");
                    continue;
                };
                if let Some((block, mark)) = r.receiver_report(now) {
                    blocks.push(block);
                    marks.push((Arc::clone(receiver), mark));
                }
                if let Some(dlrr) = r.dlrr_report(now) {
                    dlrrs.push(dlrr);
                }
            }

            if !force && !s.has_sent_since_report() && blocks.is_empty() && dlrrs.is_empty() {
                log::trace!("ssrc={:08x} has nothing to report", s.ssrc());
                continue;
            }

            let sender_ssrc = s.ssrc();
            let cname = s.cname().to_owned();
            let sr = s.on_send_sender_report(now);
            drop(s);

            match self.report_compound(sender_ssrc, &cname, sr, blocks, dlrrs) {
                Ok(buf) => {
                    out.push(buf);
                    receivers = None;
                    for (receiver, mark) in marks {
                        receiver.lock().commit_receiver_report(mark);
                    }
                }
                Err(err) => log::warn!("ssrc={:08x} report skipped: {}", sender_ssrc, err),
            }
        }
        Ok(out)
    }

    fn report_compound(
        &self,
        sender_ssrc: u32,
        cname: &str,
        sr: Option<rtcp::sender_report::SenderReport>,
        reports: Vec<ReceptionReport>,
        dlrrs: Vec<rtcp::extended_report::DlrrReport>,
    ) -> Result<Bytes> {
        let mut chunks = reports.chunks(MAX_REPORTS_PER_PACKET);
        let first = chunks.next().map(|c| c.to_vec()).unwrap_or_default();

        let mut compound = CompoundPacket::new();
        let mut xr_blocks = vec![];
        match sr {
            Some(mut sr) => {
                xr_blocks.push(ReportBlock::ReceiverReferenceTime(
                    ReceiverReferenceTimeReportBlock {
                        ntp_timestamp: sr.ntp_time,
                    },
                ));
                sr.reports = first;
                compound.add_packet(&sr)?;
            }
            None => {
                compound.add_packet(&ReceiverReport {
                    ssrc: sender_ssrc,
                    reports: first,
                    ..Default::default()
                })?;
            }
        }
        for more in chunks {
            compound.add_packet(&ReceiverReport {
                ssrc: sender_ssrc,
                reports: more.to_vec(),
                ..Default::default()
            })?;
        }

        compound.add_packet(&sdes(sender_ssrc, cname, Some(&self.config.tool_name)))?;

        if !dlrrs.is_empty() {
            xr_blocks.push(ReportBlock::Dlrr(DlrrReportBlock { reports: dlrrs }));
        }
        if !xr_blocks.is_empty() {
            compound.add_packet(&ExtendedReport {
                sender_ssrc,
                reports: xr_blocks,
            })?;
        }

        Ok(compound.freeze())
    }

    /// feedback_compound wraps feedback in the empty RR and SDES every
    /// compound packet has to open with.
    fn feedback_compound(&self, feedback: &[&(dyn RtcpPacket + Send + Sync)]) -> Result<Bytes> {
        let sender = self.default_sender()?;
        let (sender_ssrc, cname) = {
            let s = sender.lock();
            (s.ssrc(), s.cname().to_owned())
        };

        let mut compound = CompoundPacket::new();
        compound.add_packet(&ReceiverReport {
            ssrc: sender_ssrc,
            ..Default::default()
        })?;
        compound.add_packet(&sdes(sender_ssrc, &cname, None))?;
        for p in feedback {
            compound.add_packet(*p)?;
        }
        Ok(compound.freeze())
    }

    fn sender_ssrc_then<F>(&self, build: F) -> Result<Bytes>
    where
        F: FnOnce(u32) -> Vec<Box<dyn RtcpPacket + Send + Sync>>,
    {
        let sender_ssrc = self.local_sender_ssrc()?;
        let packets = build(sender_ssrc);
        let refs: Vec<&(dyn RtcpPacket + Send + Sync)> = packets.iter().map(|p| p.as_ref()).collect();
        self.feedback_compound(&refs)
    }

    pub(crate) fn build_bye(&self, sources: &[u32]) -> Result<Bytes> {
        let Some(&ssrc) = sources.first() else {
            return Err(Error::Other("BYE without sources".to_owned()));
        };
        let mut compound = CompoundPacket::new();
        compound.add_packet(&ReceiverReport {
            ssrc,
            ..Default::default()
        })?;
        compound.add_packet(&sdes(ssrc, &self.config.cname, None))?;
        compound.add_packet(&Goodbye {
            sources: sources.to_vec(),
            reason: Bytes::new(),
        })?;
        Ok(compound.freeze())
    }

    pub(crate) fn build_nack(&self, media_ssrc: u32, lost: &[u16]) -> Result<Bytes> {
        let buf = self.sender_ssrc_then(|sender_ssrc| {
            let p: Box<dyn RtcpPacket + Send + Sync> =
                Box::new(TransportLayerNack::new(sender_ssrc, media_ssrc, lost));
            vec![p]
        })?;
        if let Some(source) = self.source(media_ssrc) {
            source.lock().on_nack_sent();
        }
        log::trace!("ssrc={:08x} NACK {:?}", media_ssrc, lost);
        Ok(buf)
    }

    /// build_twcc drains the TWCC recorder, None when nothing arrived.
    pub(crate) fn build_twcc(&self) -> Result<Option<Bytes>> {
        if self.twcc.lock().is_empty() {
            return Ok(None);
        }
        let sender_ssrc = self.local_sender_ssrc()?;
        let feedback = {
            let mut twcc = self.twcc.lock();
            twcc.set_sender_ssrc(sender_ssrc);
            twcc.build_feedback()
        };
        if feedback.is_empty() {
            return Ok(None);
        }
        let refs: Vec<&(dyn RtcpPacket + Send + Sync)> = feedback
            .iter()
            .map(|fb| fb as &(dyn RtcpPacket + Send + Sync))
            .collect();
        self.feedback_compound(&refs).map(Some)
    }

    pub(crate) fn build_flow_control(&self, media_ssrc: u32, bitrate: u64, overhead: u16) -> Result<Bytes> {
        let tmmbr = self.config.feedback.contains(Feedback::TMMBR);
        self.sender_ssrc_then(|sender_ssrc| {
            let p: Box<dyn RtcpPacket + Send + Sync> = if tmmbr {
                Box::new(TemporaryMaxBitrateRequest {
                    sender_ssrc,
                    entries: vec![TmmbEntry {
                        ssrc: media_ssrc,
                        bitrate,
                        overhead,
                    }],
                })
            } else {
                Box::new(ReceiverEstimatedMaximumBitrate {
                    sender_ssrc,
                    bitrate,
                    ssrcs: vec![media_ssrc],
                })
            };
            vec![p]
        })
    }

    pub(crate) fn build_intra_frame_request(&self, media_ssrc: u32) -> Result<Bytes> {
        let pli = self.config.feedback.contains(Feedback::PLI);
        let sequence_number = if pli {
            0
        } else {
            self.fir_sequence.fetch_add(1, Ordering::SeqCst)
        };
        self.sender_ssrc_then(|sender_ssrc| {
            let p: Box<dyn RtcpPacket + Send + Sync> = if pli {
                Box::new(PictureLossIndication::new(sender_ssrc, media_ssrc))
            } else {
                Box::new(FullIntraRequest {
                    sender_ssrc,
                    media_ssrc: 0,
                    fir: vec![FirEntry {
                        ssrc: media_ssrc,
                        sequence_number,
                    }],
                })
            };
            vec![p]
        })
    }

    pub(crate) fn build_temporal_spatial_trade_off(&self, media_ssrc: u32, index: u8) -> Result<Bytes> {
        let sequence_number = self.tstr_sequence.fetch_add(1, Ordering::SeqCst);
        self.sender_ssrc_then(|sender_ssrc| {
            let p: Box<dyn RtcpPacket + Send + Sync> = Box::new(TemporalSpatialTradeOffRequest {
                sender_ssrc,
                entries: vec![TradeOffEntry {
                    ssrc: media_ssrc,
                    sequence_number,
                    index,
                }],
            });
            vec![p]
        })
    }
}
