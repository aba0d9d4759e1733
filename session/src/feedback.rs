use bitflags::bitflags;

bitflags! {
    /// Feedback is the set of RTCP feedback messages negotiated for a session.
    #[derive(Default)]
    pub struct Feedback: u32 {
        /// generic NACK, RFC 4585
        const NACK = 1 << 0;
        /// TMMBR/TMMBN, RFC 5104
        const TMMBR = 1 << 1;
        /// transport wide congestion control
        const TWCC = 1 << 2;
        /// receiver estimated maximum bitrate
        const REMB = 1 << 3;
        /// picture loss indication
        const PLI = 1 << 4;
        /// full intra request
        const FIR = 1 << 5;
        /// temporal spatial trade-off
        const TSTR = 1 << 6;
    }
}
