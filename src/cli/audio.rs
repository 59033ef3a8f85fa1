use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use dabplus::process::codec::{AudioConfig, AudioFrame, Codec};
use dabplus::process::superframe::{
    AssemblerConfig, SubchannelSinkObserver, SuperframeFilter, SuperframeStats, SuperframeStatus,
};
use dabplus::structs::pad::AncillaryData;
use indicatif::{MultiProgress, ProgressBar};

use super::command::{AudioArgs, Cli};
use super::progress::{create_progress_bar, estimate_total_records, finish_progress_bar};
use crate::input::InputReader;
use crate::timestamp::frames_time_str;

fn create_writer(path: Option<&Path>) -> Result<Option<BufWriter<File>>> {
    path.map(|path| {
        File::create(path)
            .map(BufWriter::new)
            .with_context(|| format!("Failed to create {}", path.display()))
    })
    .transpose()
}

/// Writes the codec output and X-PAD bytes. Sync and format changes are logged by the filter.
struct FileSink<W> {
    audio: Option<W>,
    xpad: Option<W>,
    pb: Option<ProgressBar>,
    pads: u64,
    xpad_bytes: u64,
    write_error: Option<io::Error>,
}

impl<W: Write> FileSink<W> {
    fn new(audio: Option<W>, xpad: Option<W>, pb: Option<ProgressBar>) -> Self {
        Self {
            audio,
            xpad,
            pb,
            pads: 0,
            xpad_bytes: 0,
            write_error: None,
        }
    }

    fn write_audio(&mut self, data: &[u8]) {
        if let Some(audio) = &mut self.audio {
            if let Err(e) = audio.write_all(data) {
                self.write_error.get_or_insert(e);
            }
        }
    }

    fn set_message(&self, message: String) {
        if let Some(pb) = &self.pb {
            pb.set_message(message);
        }
    }

    /// First write error since the last call.
    fn take_error(&mut self) -> Result<()> {
        match self.write_error.take() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.take_error()?;
        for writer in [&mut self.audio, &mut self.xpad].into_iter().flatten() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> SubchannelSinkObserver for FileSink<W> {
    fn start_audio(&mut self, config: &AudioConfig) {
        log::info!(
            "Audio output: {} Hz, {} channel(s), ASC {:02X}{:02X}",
            config.sample_rate,
            config.channels,
            config.asc[0],
            config.asc[1]
        );
        self.set_message(config.description.clone());
    }

    fn put_audio(&mut self, _au_index: usize, frame: AudioFrame<'_>) {
        match frame {
            AudioFrame::Adts(data) | AudioFrame::Raw(data) => self.write_audio(data),
            AudioFrame::Pcm { samples, .. } => {
                let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                self.write_audio(&bytes);
            }
        }
    }

    fn process_pad(&mut self, au_index: usize, pad: Option<&AncillaryData>) {
        let Some(pad) = pad else {
            return;
        };

        self.pads += 1;
        log::trace!(
            "AU {au_index}: F-PAD {:02X}{:02X}, {} X-PAD bytes",
            pad.fpad[0],
            pad.fpad[1],
            pad.xpad.len()
        );

        if let Some(xpad) = &mut self.xpad {
            match xpad.write_all(&pad.xpad) {
                Ok(()) => self.xpad_bytes += pad.xpad.len() as u64,
                Err(e) => {
                    self.write_error.get_or_insert(e);
                }
            }
        }
    }

    fn superframe_status(&mut self, status: &SuperframeStatus) {
        if status.is_degraded() {
            log::warn!(
                "Superframe {}: {} uncorrectable RS codewords",
                status.index,
                status.correction.uncorrectable
            );
        }
        if status.au_crc_errors > 0 || status.codec_errors > 0 {
            log::debug!(
                "Superframe {}: {} of {} AUs dropped by CRC, {} codec errors",
                status.index,
                status.au_crc_errors,
                status.num_aus,
                status.codec_errors
            );
        }
    }
}

fn frame_config(args: &AudioArgs) -> Result<AssemblerConfig> {
    let mut config = match (args.bitrate, args.frame_len) {
        (Some(bitrate), _) => AssemblerConfig::from_bitrate(bitrate),
        (None, Some(frame_len)) => AssemblerConfig::new(frame_len),
        (None, None) => anyhow::bail!("Either --bitrate or --frame-len is required"),
    };
    config.sync_threshold = args.sync_threshold;
    Ok(config)
}

pub fn cmd_audio(args: &AudioArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = frame_config(args)?;
    log::info!(
        "Decoding sub-channel: {} ({} byte frames, {} codec)",
        args.input.display(),
        config.frame_len,
        args.codec
    );

    let mut input_reader = InputReader::new(&args.input)?;

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(
            multi,
            estimate_total_records(input_reader.size(), config.frame_len),
            "frames",
        )?),
        None => None,
    };

    let sink = FileSink::new(
        create_writer(args.output.as_deref())?,
        create_writer(args.xpad_output.as_deref())?,
        pb.clone(),
    );
    let mut filter = SuperframeFilter::new(config, Codec::new(args.codec), sink)?;

    let mut frames = 0u64;
    let trailing = input_reader.process_records(config.frame_len, |frame| {
        filter.feed(frame)?;
        filter.observer_mut().take_error()?;

        frames += 1;
        if let Some(pb) = &pb {
            pb.inc(1);
        }
        Ok(true)
    })?;

    if trailing > 0 {
        log::warn!("Ignored {trailing} trailing bytes after the last complete frame");
    }

    filter.observer_mut().flush()?;

    let stats = *filter.stats();
    finish_progress_bar(
        &pb,
        format!(
            "{} superframes | {} AUs | {} sync losses",
            stats.superframes, stats.aus, stats.sync_losses
        ),
    );

    let sink = filter.into_observer();
    print_summary(frames, &stats, &sink);

    Ok(())
}

fn print_summary<W>(frames: u64, stats: &SuperframeStats, sink: &FileSink<W>) {
    println!("Stream time:          {}", frames_time_str(frames));
    println!("Superframes:          {}", stats.superframes);
    println!("Sync losses:          {}", stats.sync_losses);
    println!(
        "RS corrections:       {} symbols, {} uncorrectable codewords",
        stats.rs_corrected_symbols, stats.rs_uncorrectable_codewords
    );
    println!("Degraded superframes: {}", stats.degraded_superframes);
    println!(
        "Access units:         {} ({} CRC errors, {} codec errors)",
        stats.aus, stats.au_crc_errors, stats.codec_errors
    );
    println!(
        "PAD:                  {} AUs, {} X-PAD bytes written",
        sink.pads, sink.xpad_bytes
    );
}

#[test]
fn sink_writes_audio_and_xpad() -> Result<()> {
    let mut sink = FileSink::new(Some(Vec::new()), Some(Vec::new()), None);

    sink.put_audio(0, AudioFrame::Raw(&[1, 2, 3]));
    sink.put_audio(1, AudioFrame::Pcm {
        samples: &[-2, 0x0102],
        channels: 1,
        sample_rate: 48000,
    });
    sink.process_pad(0, None);
    sink.process_pad(1, Some(&AncillaryData {
        xpad: vec![0xAA, 0xBB],
        fpad: [0x00, 0x02],
    }));
    sink.flush()?;

    assert_eq!(sink.audio.as_deref(), Some(&[1, 2, 3, 0xFE, 0xFF, 0x02, 0x01][..]));
    assert_eq!(sink.xpad.as_deref(), Some(&[0xAA, 0xBB][..]));
    assert_eq!(sink.pads, 1);
    assert_eq!(sink.xpad_bytes, 2);
    Ok(())
}

#[test]
fn frame_length_from_arguments() -> Result<()> {
    use super::command::Commands;
    use clap::Parser;

    let cli = Cli::parse_from(["dabplusd", "audio", "-", "--frame-len", "360", "--sync-threshold", "3"]);
    let Commands::Audio(args) = cli.command else {
        panic!("expected audio command");
    };

    let config = frame_config(&args)?;
    assert_eq!(config.frame_len, 360);
    assert_eq!(config.sync_threshold, 3);
    Ok(())
}
