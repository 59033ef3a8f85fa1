use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use dabplus::process::fic::{FicDecoder, FicDecoderConfig, FicDecoderObserver, FicHandle, FicStats};
use dabplus::structs::fig::FIB_LEN;
use dabplus::structs::service::Service;
use indicatif::{MultiProgress, ProgressBar};

use super::command::{Cli, FicArgs};
use super::progress::{create_progress_bar, estimate_total_records, finish_progress_bar};
use crate::input::InputReader;
use crate::report::DirectoryReport;

/// Directory changes forwarded from the decoder thread.
#[derive(Debug)]
enum FicEvent {
    EnsembleChanged,
    NewServices(Vec<Service>),
    ServiceChanged(Service),
    ServicesRemoved(Vec<u16>),
}

struct ChannelObserver {
    tx: mpsc::Sender<FicEvent>,
}

impl ChannelObserver {
    fn send(&self, event: FicEvent) {
        // the receiver only goes away when the command is failing anyway
        let _ = self.tx.send(event);
    }
}

impl FicDecoderObserver for ChannelObserver {
    fn fic_change_ensemble(&mut self) {
        self.send(FicEvent::EnsembleChanged);
    }

    fn fic_change_services(&mut self, services: &[Service]) {
        self.send(FicEvent::NewServices(services.to_vec()));
    }

    fn fic_change_service(&mut self, service: &Service) {
        self.send(FicEvent::ServiceChanged(*service));
    }

    fn fic_remove_services(&mut self, sids: &[u16]) {
        self.send(FicEvent::ServicesRemoved(sids.to_vec()));
    }
}

fn spawn_decoder_thread(
    input: PathBuf,
    mut decoder: FicDecoder<ChannelObserver>,
    pb: Option<ProgressBar>,
) -> thread::JoinHandle<Result<FicStats>> {
    thread::spawn(move || -> Result<FicStats> {
        let mut input_reader = InputReader::new(&input)?;

        let trailing = input_reader.process_records(FIB_LEN, |fib| {
            decoder.process(fib);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            Ok(true)
        })?;

        if trailing > 0 {
            log::warn!("Ignored {trailing} trailing bytes after the last complete FIB");
        }

        let stats = *decoder.stats();
        log::info!(
            "Processing complete: {} FIBs, {} CRC errors",
            stats.fibs + stats.fib_crc_errors,
            stats.fib_crc_errors
        );
        Ok(stats)
    })
}

pub fn cmd_fic(args: &FicArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Decoding FIC: {}", args.input.display());

    let config = FicDecoderConfig {
        check_crc: !args.no_fib_crc,
        stale_cycles: args.stale_cycles,
        ..Default::default()
    };

    let pb = match multi {
        Some(multi) => {
            let size = InputReader::new(&args.input)?.size();
            Some(create_progress_bar(
                multi,
                estimate_total_records(size, FIB_LEN),
                "FIBs",
            )?)
        }
        None => None,
    };

    let (tx, rx) = mpsc::channel();
    let decoder = FicDecoder::new(config, ChannelObserver { tx });
    let handle = decoder.handle();
    let decode_thread = spawn_decoder_thread(args.input.clone(), decoder, pb.clone());

    // ends once the decoder thread dropped the observer
    while let Ok(event) = rx.recv() {
        print_event(event, &handle, &pb);
    }

    let stats = match decode_thread.join() {
        Ok(Ok(stats)) => stats,
        Ok(Err(e)) => {
            finish_progress_bar(&pb, "decode failed".to_string());
            return Err(e);
        }
        Err(_) => {
            finish_progress_bar(&pb, "decode thread panicked".to_string());
            return Err(anyhow::anyhow!("Decode thread panicked"));
        }
    };

    let directory = handle.snapshot();
    finish_progress_bar(
        &pb,
        format!(
            "{} services | {} FIB CRC errors",
            directory.services.len(),
            stats.fib_crc_errors
        ),
    );

    print_directory(&handle);

    if let Some(path) = &args.yaml {
        DirectoryReport::new(&directory, &stats).write(path)?;
    }

    Ok(())
}

fn print_event(event: FicEvent, handle: &FicHandle, pb: &Option<ProgressBar>) {
    let line = match event {
        FicEvent::EnsembleChanged => {
            let ensemble = handle.ensemble();
            let label = ensemble
                .label
                .map(|label| label.text().trim_end().to_string())
                .unwrap_or_default();
            format!("Ensemble {:#06X}: {label}", ensemble.eid)
        }
        FicEvent::NewServices(services) => services
            .iter()
            .map(|service| format!("+ {}", service_line(service)))
            .collect::<Vec<_>>()
            .join("\n"),
        FicEvent::ServiceChanged(service) => format!("~ {}", service_line(&service)),
        FicEvent::ServicesRemoved(sids) => sids
            .iter()
            .map(|sid| format!("- {sid:#06X}"))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    match pb {
        Some(pb) => pb.println(line),
        None => println!("{line}"),
    }
}

fn service_line(service: &Service) -> String {
    let subchannel = &service.subchannel;
    format!(
        "{:#06X} {:16} SubChId {:2} {:>4} {:3} kbit/s {}",
        service.sid,
        service.display_name(),
        subchannel.subchid,
        if service.audio.dab_plus { "DAB+" } else { "DAB" },
        subchannel.bitrate,
        subchannel.protection,
    )
}

fn print_directory(handle: &FicHandle) {
    let directory = handle.snapshot();

    println!();
    if directory.ensemble.is_set() {
        let label = directory.ensemble.label.unwrap_or_default();
        println!(
            "Ensemble {:#06X} '{}' ('{}')",
            directory.ensemble.eid,
            label.text().trim_end(),
            label.short_text()
        );
    } else {
        println!("No ensemble label received.");
    }

    for service in directory.services.values() {
        println!("  {}", service_line(service));
    }
}

#[test]
fn service_line_layout() {
    use dabplus::structs::label::FicLabel;
    use dabplus::structs::service::{AudioService, SubchannelOrga};

    let mut label = FicLabel::default();
    label.label.copy_from_slice(b"Jazz Radio      ");

    let service = Service {
        sid: 0xD210,
        subchannel: SubchannelOrga::uep(4, 0, 33),
        audio: AudioService {
            subchid: 4,
            dab_plus: true,
        },
        label: Some(label),
    };

    assert_eq!(
        service_line(&service),
        "0xD210 Jazz Radio       SubChId  4 DAB+ 128 kbit/s UEP 5"
    );
}
