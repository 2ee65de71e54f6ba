//! Capture decoder (C8): rows -> clusters -> events, RLE-expanded along the
//! timestamp axis, bit-deinterleaved at 100/200 MHz, trigger-located to
//! sub-event precision, and clamped to a host-supplied sample cap before
//! reaching the datafeed (`spec.md` §4.8).

use log::{debug, info};

use crate::acquisition::{force_stop, StopStatus};
use crate::datafeed::{Datafeed, LogicPacket};
use crate::dram::{self, ROW_COUNT, ROW_LENGTH_BYTES};
use crate::error::Result;
use crate::link::ByteLink;
use crate::register::RegisterProtocol;
use crate::samplerate::Samplerate;
use crate::trigger::TriggerConfig;

/// 7 timestamped sample items per DRAM cluster (`spec.md` §3 "Cluster").
pub const EVENTS_PER_CLUSTER: usize = 7;
/// 64 clusters per row, 7 events each (`spec.md` §3 "Row").
pub const EVENTS_PER_ROW: usize = 448;
/// Bytes per DRAM cluster: a 16-bit timestamp plus 7 packed 16-bit items.
pub const CLUSTER_BYTES: usize = 16;
/// Number of low bits of a position counter that address within a row.
const ROW_SHIFT: u32 = 9;
/// How many decoded samples `get_trigger_offset` searches before giving
/// up (`spec.md` §4.8 "Trigger pinpointing").
const TRIGGER_SEARCH_WINDOW: usize = 8;
/// Rows are drained from the device in chunks no larger than this
/// (`spec.md` §4.7 "Reader must request no more than 32 rows per call").
const ROWS_PER_CHUNK: u32 = dram::MAX_ROWS_PER_READ;

static_assertions::const_assert_eq!(EVENTS_PER_ROW, 64 * EVENTS_PER_CLUSTER);
static_assertions::const_assert_eq!(CLUSTER_BYTES, 2 + 2 * EVENTS_PER_CLUSTER);

/// Everything the decoder remembers across clusters within one download:
/// the running RLE timestamp base and the last sample value held during
/// idle time (`spec.md` §3 "decode scratch").
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeState {
    pub lastts: u16,
    pub lastsample: u16,
}

/// Wraps a [`Datafeed`] so every emitted packet is clamped against an
/// optional sample cap, exactly as the original's single
/// `sigma_session_send` call site does (`spec.md` §4.8 "Downstream
/// clamping", `SPEC_FULL.md` §3).
struct SampleSink<'a, D> {
    datafeed: &'a mut D,
    cap: Option<u64>,
    sent: u64,
}

impl<'a, D: Datafeed> SampleSink<'a, D> {
    fn new(datafeed: &'a mut D, cap: Option<u64>) -> Self {
        SampleSink {
            datafeed,
            cap,
            sent: 0,
        }
    }

    /// Sends `samples` (a run of little-endian `u16` channel snapshots),
    /// truncating to what remains under the cap and dropping the packet
    /// entirely if nothing remains.
    fn send_logic(&mut self, samples: &[u8]) {
        let mut unit_count = (samples.len() / 2) as u64;
        let mut data = samples;
        if let Some(cap) = self.cap {
            if self.sent + unit_count > cap {
                unit_count = cap.saturating_sub(self.sent);
                data = &samples[..(unit_count as usize) * 2];
            }
            if unit_count == 0 {
                return;
            }
        }
        self.sent += unit_count;
        self.datafeed.send_logic(LogicPacket {
            unit_size: 2,
            data,
        });
    }

    fn send_trigger(&mut self) {
        self.datafeed.send_trigger();
    }

    fn end(&mut self) {
        self.datafeed.end();
    }
}

/// Cluster timestamp: little-endian across the transit bytes, reassembled
/// `hi << 8 | lo` (`spec.md` §3 "Cluster").
fn cluster_ts(cluster: &[u8]) -> u16 {
    u16::from_le_bytes([cluster[0], cluster[1]])
}

/// One packed 16-bit sample item from a cluster, already byte-swapped on
/// transit (`spec.md` §3 "Sample item encoding").
fn cluster_item(cluster: &[u8], idx: usize) -> u16 {
    let off = 2 + idx * 2;
    u16::from_be_bytes([cluster[off], cluster[off + 1]])
}

/// Deinterleaves one sub-sample out of a packed item. `stride` is the
/// number of sub-samples packed per item (2 at 100 MHz, 4 at 200 MHz);
/// `sub_index` selects which one. The `(k*stride - k)` exponent is
/// load-bearing: bit `k` of sub-sample `sub_index` lives at bit
/// `sub_index + k*stride` of the packed item (`spec.md` §4.8 "Event
/// decode", §9 "Deinterleave stride formula").
fn deinterleave(item: u16, sub_index: u32, stride: u32, bits: u32) -> u16 {
    let shifted = item >> sub_index;
    let mut out = 0u16;
    for k in 0..bits {
        let exponent = k * stride - k;
        out |= (shifted >> exponent) & (1 << k);
    }
    out
}

fn deinterleave_100mhz(item: u16, sub_index: u32) -> u16 {
    deinterleave(item, sub_index, 2, 8)
}

fn deinterleave_200mhz(item: u16, sub_index: u32) -> u16 {
    deinterleave(item, sub_index, 4, 4)
}

/// Finds the sub-event-precise trigger offset within the next `8`
/// decoded samples, starting from `last_sample` (`spec.md` §4.8 "Trigger
/// pinpointing"). Returns an index in `0..=7`. `samples` may be shorter
/// than 8 (basic rates can decode as few as 7 events per cluster); the
/// search is bounded by `samples.len()` so it never indexes past the
/// window. If no sample in the window satisfies the configured
/// condition, the search runs to completion and the raw loop counter is
/// masked with `0x7`, matching the original's `return i & 0x7` exactly
/// (`spec.md` §9: preserve this arithmetic verbatim, do not reinterpret).
fn get_trigger_offset(samples: &[u16], mut last_sample: u16, cfg: &TriggerConfig) -> usize {
    let mut sample = 0u16;
    let mut i = 0;
    let window = TRIGGER_SEARCH_WINDOW.min(samples.len());
    while i < window {
        if i > 0 {
            last_sample = sample;
        }
        sample = samples[i];

        if sample & cfg.simple_mask != cfg.simple_value {
            i += 1;
            continue;
        }
        if (last_sample & cfg.rising_mask != 0) || (sample & cfg.rising_mask != cfg.rising_mask) {
            i += 1;
            continue;
        }
        if (last_sample & cfg.falling_mask != cfg.falling_mask) || (sample & cfg.falling_mask != 0)
        {
            i += 1;
            continue;
        }
        break;
    }
    i & 0x7
}

struct ClusterParams<'a> {
    samplerate: Samplerate,
    trigger_cfg: &'a TriggerConfig,
    use_triggers: bool,
}

/// Decodes one DRAM cluster: RLE-expands the idle time since the last
/// cluster, decodes its events (deinterleaving at 100/200 MHz), locates
/// the trigger to sub-event precision if it falls in this cluster, and
/// pushes everything to `sink` (`spec.md` §4.8 "RLE expansion", "Event
/// decode", "Trigger pinpointing"; mirrors `sigma_decode_dram_cluster`).
fn decode_cluster<D: Datafeed>(
    cluster: &[u8],
    events_in_cluster: usize,
    triggered: bool,
    params: &ClusterParams<'_>,
    samples_per_event: u8,
    state: &mut DecodeState,
    sink: &mut SampleSink<'_, D>,
) {
    let ts = cluster_ts(cluster);
    let tsdiff = ts.wrapping_sub(state.lastts);
    state.lastts = ts.wrapping_add(EVENTS_PER_CLUSTER as u16);

    // RLE expansion: emit `tsdiff` copies of the held sample, chunked at
    // 1024 samples per packet exactly as upstream chunks its scratch
    // buffer (`spec.md` §4.8 "RLE expansion").
    let mut chunk = [0u8; 1024 * 2];
    for t in 0..tsdiff {
        let i = (t as usize) % 1024;
        chunk[i * 2..i * 2 + 2].copy_from_slice(&state.lastsample.to_le_bytes());
        if i == 1023 || t == tsdiff - 1 {
            let bytes = &chunk[..(i + 1) * 2];
            for _ in 0..samples_per_event {
                sink.send_logic(bytes);
            }
        }
    }

    let hz = params.samplerate.as_hz();
    let mut decoded = [0u16; EVENTS_PER_CLUSTER * 4];
    let mut decoded_len = 0usize;
    let mut last_decoded = 0u16;
    for i in 0..events_in_cluster {
        let item = cluster_item(cluster, i);
        if hz == 200_000_000 {
            for sub in 0..4 {
                last_decoded = deinterleave_200mhz(item, sub);
                decoded[decoded_len] = last_decoded;
                decoded_len += 1;
            }
        } else if hz == 100_000_000 {
            for sub in 0..2 {
                last_decoded = deinterleave_100mhz(item, sub);
                decoded[decoded_len] = last_decoded;
                decoded_len += 1;
            }
        } else {
            last_decoded = item;
            decoded[decoded_len] = last_decoded;
            decoded_len += 1;
        }
    }

    let mut send_from = 0usize;
    if triggered {
        let offset = get_trigger_offset(&decoded[..decoded_len.min(8)], state.lastsample, params.trigger_cfg);
        if offset > 0 {
            let trig_count = offset * samples_per_event as usize;
            let bytes = as_le_bytes(&decoded[..trig_count.min(decoded_len)]);
            sink.send_logic(&bytes);
            send_from = trig_count.min(decoded_len);
        }
        if params.use_triggers {
            sink.send_trigger();
        }
    }

    if send_from < decoded_len {
        let bytes = as_le_bytes(&decoded[send_from..decoded_len]);
        sink.send_logic(&bytes);
    }

    state.lastsample = last_decoded;
}

fn as_le_bytes(samples: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Decodes one 1024-byte DRAM row into its clusters
/// (`spec.md` §4.8 "Per cluster"; mirrors `decode_chunk_ts`).
///
/// `trigger_event` is only meaningful when `< EVENTS_PER_ROW`; the
/// device's row/event split (`trigger_pos & 0x1ff`) can report values up
/// to 511, and values `>= EVENTS_PER_ROW` mean the trigger isn't in this
/// row (mirrors the original's `if (trigger_event < EVENTS_PER_ROW)`
/// guard, `protocol.c:1034`).
fn decode_row<D: Datafeed>(
    row: &[u8],
    events_in_line: usize,
    trigger_event: Option<u32>,
    params: &ClusterParams<'_>,
    samples_per_event: u8,
    state: &mut DecodeState,
    sink: &mut SampleSink<'_, D>,
) {
    let clusters_in_line = events_in_line.div_ceil(EVENTS_PER_CLUSTER);

    let trigger_cluster = trigger_event
        .filter(|&te| te < EVENTS_PER_ROW as u32)
        .map(|te| {
            let te = if params.samplerate.as_hz() <= 50_000_000 {
                te.saturating_sub((EVENTS_PER_CLUSTER as u32 - 1).min(te))
            } else {
                te
            };
            (te / EVENTS_PER_CLUSTER as u32) as usize
        });

    for i in 0..clusters_in_line {
        let cluster = &row[i * CLUSTER_BYTES..(i + 1) * CLUSTER_BYTES];
        let events_in_cluster = if i == clusters_in_line - 1 && !events_in_line.is_multiple_of(EVENTS_PER_CLUSTER)
        {
            events_in_line % EVENTS_PER_CLUSTER
        } else {
            EVENTS_PER_CLUSTER
        };
        let triggered = trigger_cluster == Some(i);
        decode_cluster(
            cluster,
            events_in_cluster,
            triggered,
            params,
            samples_per_event,
            state,
            sink,
        );
    }
}

/// Drains the device's DRAM after a force-stop and pushes every decoded
/// sample to `datafeed` (`spec.md` §4.8; mirrors `download_capture`).
///
/// Computes the row range from `status` (skipping the wrap-adjacent row
/// when `status.round` is set), reads it back in chunks of at most 32
/// rows via the DRAM reader (C7), and decodes each row in turn. The
/// decoder's scratch state is reset at the first row, seeded from that
/// row's own first cluster timestamp so the initial RLE gap is zero
/// (`spec.md` §3 "Lifecycles").
#[allow(clippy::too_many_arguments)]
pub fn download_capture<L: ByteLink, D: Datafeed>(
    protocol: &mut RegisterProtocol<L>,
    samplerate: Samplerate,
    trigger_cfg: &TriggerConfig,
    use_triggers: bool,
    sample_cap: Option<u64>,
    datafeed: &mut D,
) -> Result<StopStatus> {
    info!("downloading sample data");
    let status = force_stop(protocol)?;

    let trg_line = if status.triggered {
        Some(status.trigger_line())
    } else {
        None
    };
    let trg_event = if status.triggered {
        status.trigger_event()
    } else {
        u32::MAX
    };

    let mut dl_first_line = 0u32;
    let mut dl_lines_total = (status.stop_pos >> ROW_SHIFT) + 1;
    if status.round {
        dl_first_line = dl_lines_total + 1;
        dl_lines_total = ROW_COUNT - 2;
    }

    let samples_per_event = samplerate.samples_per_event();
    let params = ClusterParams {
        samplerate,
        trigger_cfg,
        use_triggers,
    };
    let mut state = DecodeState::default();
    let mut sink = SampleSink::new(datafeed, sample_cap);

    let mut done = 0u32;
    while done < dl_lines_total {
        let lines_now = ROWS_PER_CHUNK.min(dl_lines_total - done);
        let start_row = ((dl_first_line + done) % ROW_COUNT) as u16;
        let bytes = dram::read_dram(protocol, start_row, lines_now)?;
        debug!("decoding {lines_now} row(s) starting at row {start_row}");

        if done == 0 {
            state.lastts = cluster_ts(&bytes[0..CLUSTER_BYTES]);
            state.lastsample = 0;
        }

        for i in 0..lines_now {
            let row = &bytes[(i as usize) * ROW_LENGTH_BYTES..(i as usize + 1) * ROW_LENGTH_BYTES];
            let is_last_line = done + i == dl_lines_total - 1;
            let events_in_line = if is_last_line {
                (status.stop_pos & 0x1ff) as usize
            } else {
                EVENTS_PER_ROW
            };
            let trigger_event = if trg_line == Some(done + i) {
                Some(trg_event)
            } else {
                None
            };
            decode_row(
                row,
                events_in_line,
                trigger_event,
                &params,
                samples_per_event,
                &mut state,
                &mut sink,
            );
        }

        done += lines_now;
    }

    sink.end();
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockDatafeed;

    #[test]
    fn cluster_ts_is_little_endian() {
        assert_eq!(cluster_ts(&[0x01, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), 0x0201);
    }

    #[test]
    fn cluster_item_is_byte_swapped_on_transit() {
        let mut cluster = [0u8; CLUSTER_BYTES];
        cluster[2] = 0xab;
        cluster[3] = 0xcd;
        assert_eq!(cluster_item(&cluster, 0), 0xabcd);
    }

    #[test]
    fn deinterleave_200mhz_channel_zero_sub_index_zero() {
        // Only channel 0's bit set at sub-index 0: bit 0 of the packed
        // item (since exponent for k=0 is always 0 regardless of stride).
        assert_eq!(deinterleave_200mhz(0b0001, 0), 1);
        assert_eq!(deinterleave_200mhz(0b0001, 1), 0);
    }

    #[test]
    fn deinterleave_200mhz_of_gold_vector() {
        // spec.md §8 scenario 4 pins this as a gold vector; the exact
        // value is implementation-defined by the stride-4 map, computed
        // here from the formula in `deinterleave` rather than guessed.
        assert_eq!(deinterleave_200mhz(0xF0F0, 0), 0x000a);
        assert_eq!(deinterleave_200mhz(0xF0F0, 1), 0x000a);
    }

    #[test]
    fn deinterleave_only_sets_the_fed_channel_bit() {
        for c in 0..4u32 {
            for sub in 0..4u32 {
                let item = 1u16 << (sub + c * 4);
                let out = deinterleave_200mhz(item, sub);
                assert_eq!(out, 1 << c, "channel={c} sub={sub}");
                for other_sub in 0..4u32 {
                    if other_sub != sub {
                        assert_eq!(deinterleave_200mhz(item, other_sub), 0);
                    }
                }
            }
        }
    }

    #[test]
    fn trigger_offset_finds_rising_edge() {
        let cfg = TriggerConfig {
            simple_value: 0,
            simple_mask: 0,
            rising_mask: 0x0008,
            falling_mask: 0,
        };
        let samples = [0x0000, 0x0000, 0x0008, 0x0008, 0, 0, 0, 0];
        assert_eq!(get_trigger_offset(&samples, 0x0000, &cfg), 2);
    }

    #[test]
    fn trigger_offset_wraps_to_zero_when_nothing_in_the_window_matches() {
        let cfg = TriggerConfig {
            simple_value: 1,
            simple_mask: 1,
            rising_mask: 0,
            falling_mask: 0,
        };
        let samples = [0u16; 8];
        assert_eq!(get_trigger_offset(&samples, 0, &cfg), 0);
    }

    #[test]
    fn trigger_offset_does_not_panic_on_a_basic_rate_short_window() {
        // At basic rates (<=50MHz) a cluster decodes to 7 events, not 8;
        // callers pass a 7-long window. Nothing in it matches, so the
        // search must run to completion against the slice's own length
        // rather than indexing past it.
        let cfg = TriggerConfig {
            simple_value: 1,
            simple_mask: 1,
            rising_mask: 0,
            falling_mask: 0,
        };
        let samples = [0u16; 7];
        assert_eq!(get_trigger_offset(&samples, 0, &cfg), 7);
    }

    #[test]
    fn sample_sink_truncates_to_cap_and_drops_when_exhausted() {
        let mut feed = MockDatafeed::new();
        {
            let mut sink = SampleSink::new(&mut feed, Some(3));
            sink.send_logic(&[1, 0, 2, 0, 3, 0, 4, 0]); // 4 samples, cap 3
            sink.send_logic(&[5, 0]); // cap exhausted, dropped entirely
        }
        assert_eq!(feed.samples(), vec![1, 2, 3]);
        assert_eq!(feed.logic_packets.len(), 1);
    }

    #[test]
    fn decode_row_emits_rle_padding_then_fresh_events() {
        let cfg = TriggerConfig::none();
        let params = ClusterParams {
            samplerate: Samplerate::Mhz1,
            trigger_cfg: &cfg,
            use_triggers: false,
        };
        let mut row = vec![0u8; ROW_LENGTH_BYTES];
        // First cluster: ts=0, 7 events, all zero except the last
        // (index 6, bytes 14..16) which holds 0xbeef.
        row[2 + 6 * 2] = 0xbe;
        row[2 + 6 * 2 + 1] = 0xef;
        // Second cluster (bytes 16..32): ts=12, so tsdiff=12-7=5 ticks
        // of RLE holding 0xbeef before its own (single) event arrives.
        row[16] = 0x0c;
        row[17] = 0x00;
        row[16 + 2] = 0x12;
        row[16 + 3] = 0x34;

        let mut state = DecodeState::default();
        let mut feed = MockDatafeed::new();
        {
            let mut sink = SampleSink::new(&mut feed, None);
            // events_in_line=8: cluster 0 gets the full 7 events, cluster
            // 1 (the last) is short at 8 % 7 = 1 event.
            decode_row(&row, 8, None, &params, 1, &mut state, &mut sink);
        }

        let samples = feed.samples();
        // cluster 0: tsdiff=0 (seeded lastts=0), 7 fresh events, last one
        // 0xbeef (the value RLE then holds).
        // cluster 1: tsdiff=5, five copies of 0xbeef, then fresh 0x1234.
        let mut expected = vec![0, 0, 0, 0, 0, 0, 0xbeef];
        expected.extend(std::iter::repeat(0xbeef).take(5));
        expected.push(0x1234);
        assert_eq!(samples, expected);
    }

    #[test]
    fn decode_row_ignores_a_trigger_event_outside_this_row() {
        // trigger_pos & 0x1ff can land in [448, 511]: that's the next
        // row's event space, not this one's, and must never be treated
        // as a trigger in the current row's clusters.
        let cfg = TriggerConfig::none();
        let params = ClusterParams {
            samplerate: Samplerate::Mhz1,
            trigger_cfg: &cfg,
            use_triggers: true,
        };
        let row = vec![0u8; ROW_LENGTH_BYTES];
        let mut state = DecodeState::default();
        let mut feed = MockDatafeed::new();
        {
            let mut sink = SampleSink::new(&mut feed, None);
            decode_row(&row, EVENTS_PER_ROW, Some(450), &params, 1, &mut state, &mut sink);
        }
        assert_eq!(feed.trigger_markers, 0);
    }
}
