//! Fast Information Channel decoder.
//!
//! The decoder parses FIBs into FIGs and maintains the ensemble and its
//! service directory. The directory is shared with other threads through
//! [`FicHandle`]; readers always get a copy of a consistent state. Changes
//! are reported to a [`FicDecoderObserver`] after the directory is updated,
//! outside of the lock.
//!
//! ## Service Completeness
//!
//! A service enters the directory once both its primary audio component
//! (FIG 0/2) and the organization of the referenced sub-channel (FIG 0/1)
//! are known, regardless of the order in which they arrive. Labels and FEC
//! schemes are merged in as they show up.
//!
//! ## Directory Maintenance
//!
//! The FIC repeats all signaling continuously. Services not reasserted by
//! FIG 0/2 for a number of cycles are dropped; an ensemble with a different
//! EId replaces the whole directory.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, bail};
use log::{debug, info, trace, warn};

use crate::structs::fig::{
    ASCTY_DAB, ASCTY_DAB_PLUS, EnsembleInfo, FIB_DATA_LEN, FIB_LEN, FIG_END_MARKER, FecEntry,
    Fig0Header, Fig1Header, FigHeader, LabelRecord, ServiceComponent, ServiceEntry,
};
use crate::structs::label::FicLabel;
use crate::structs::service::{AudioService, Ensemble, Service, SubchannelOrga};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::{CRC_CCITT_ALG, Crc16};
use crate::utils::errors::FicError;

static FIB_CRC: Crc16 = Crc16::new(&CRC_CCITT_ALG);

/// Receiver of directory changes. All methods default to doing nothing.
pub trait FicDecoderObserver {
    /// The ensemble identity or label changed; re-read it through the handle.
    fn fic_change_ensemble(&mut self) {}
    /// Services that became complete since the last notification.
    fn fic_change_services(&mut self, _services: &[Service]) {}
    /// A known service changed, e.g. its label arrived.
    fn fic_change_service(&mut self, _service: &Service) {}
    /// Services dropped after they were no longer signaled.
    fn fic_remove_services(&mut self, _sids: &[u16]) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FicDecoderConfig {
    /// Discard FIBs failing the CRC check.
    pub check_crc: bool,
    /// Valid FIBs per maintenance cycle.
    pub cycle_fibs: u64,
    /// Cycles without FIG 0/2 after which a service is dropped, 0 keeps services forever.
    pub stale_cycles: u64,
}

impl Default for FicDecoderConfig {
    fn default() -> Self {
        Self {
            check_crc: true,
            cycle_fibs: 250,
            stale_cycles: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FicStats {
    pub fibs: u64,
    pub fib_crc_errors: u64,
    pub figs: u64,
    pub fig_errors: u64,
}

/// The shared part of the decoder state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FicDirectory {
    pub ensemble: Ensemble,
    pub services: BTreeMap<u16, Service>,
}

/// Cloneable read access to the directory of a [`FicDecoder`].
#[derive(Debug, Clone, Default)]
pub struct FicHandle {
    directory: Arc<Mutex<FicDirectory>>,
}

impl FicHandle {
    fn lock(&self) -> MutexGuard<'_, FicDirectory> {
        // the directory is replaced as a whole, so a poisoned lock still holds a consistent state
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ensemble(&self) -> Ensemble {
        self.lock().ensemble
    }

    /// Complete services ordered by SId.
    pub fn services(&self) -> Vec<Service> {
        self.lock().services.values().copied().collect()
    }

    pub fn service(&self, sid: u16) -> Option<Service> {
        self.lock().services.get(&sid).copied()
    }

    pub fn snapshot(&self) -> FicDirectory {
        self.lock().clone()
    }
}

/// Changes collected while processing one batch of FIBs.
#[derive(Debug, Default)]
struct Changes {
    ensemble: bool,
    new_services: Vec<Service>,
    changed_services: Vec<Service>,
    removed: Vec<u16>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        !self.ensemble
            && self.new_services.is_empty()
            && self.changed_services.is_empty()
            && self.removed.is_empty()
    }

    fn add_new(&mut self, service: Service) {
        self.removed.retain(|&sid| sid != service.sid);
        self.new_services.push(service);
    }

    fn add_changed(&mut self, service: Service) {
        // a service first reported in this batch is reported once, with its latest state
        if let Some(new) = self.new_services.iter_mut().find(|s| s.sid == service.sid) {
            *new = service;
        } else if let Some(changed) = self
            .changed_services
            .iter_mut()
            .find(|s| s.sid == service.sid)
        {
            *changed = service;
        } else {
            self.changed_services.push(service);
        }
    }

    fn add_removed(&mut self, sid: u16) {
        let new_len = self.new_services.len();
        self.new_services.retain(|s| s.sid != sid);
        self.changed_services.retain(|s| s.sid != sid);

        // never announced, nothing to remove for the observer
        if self.new_services.len() == new_len {
            self.removed.push(sid);
        }
    }
}

/// Decodes FIBs into the ensemble and service directory.
///
/// # Example
///
/// ```rust,no_run
/// use dabplus::process::fic::{FicDecoder, FicDecoderConfig, FicDecoderObserver};
/// use dabplus::structs::service::Service;
///
/// struct Printer;
/// impl FicDecoderObserver for Printer {
///     fn fic_change_services(&mut self, services: &[Service]) {
///         for service in services {
///             println!("New service: {}", service.display_name());
///         }
///     }
/// }
///
/// let mut decoder = FicDecoder::new(FicDecoderConfig::default(), Printer);
/// let handle = decoder.handle();
///
/// let fic = std::fs::read("ensemble.fic")?;
/// decoder.process(&fic);
///
/// println!("{} services", handle.services().len());
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct FicDecoder<O> {
    config: FicDecoderConfig,
    observer: O,
    directory: FicHandle,

    ensemble: Ensemble,
    ensemble_info: Option<EnsembleInfo>,
    subchannels: BTreeMap<u8, SubchannelOrga>,
    fec_schemes: BTreeMap<u8, u8>,
    audio_bindings: BTreeMap<u16, AudioService>,
    labels: BTreeMap<u16, FicLabel>,
    /// Cycle in which FIG 0/2 last defined the SId.
    last_seen: BTreeMap<u16, u64>,
    services: BTreeMap<u16, Service>,

    new_services: Vec<Service>,
    cycle: u64,
    stats: FicStats,
}

impl<O> FicDecoder<O>
where
    O: FicDecoderObserver,
{
    pub fn new(config: FicDecoderConfig, observer: O) -> Self {
        Self {
            config,
            observer,
            directory: FicHandle::default(),
            ensemble: Ensemble::default(),
            ensemble_info: None,
            subchannels: BTreeMap::new(),
            fec_schemes: BTreeMap::new(),
            audio_bindings: BTreeMap::new(),
            labels: BTreeMap::new(),
            last_seen: BTreeMap::new(),
            services: BTreeMap::new(),
            new_services: Vec::new(),
            cycle: 0,
            stats: FicStats::default(),
        }
    }

    /// A handle for reading the directory, also from other threads.
    pub fn handle(&self) -> FicHandle {
        self.directory.clone()
    }

    pub fn ensemble(&self) -> Ensemble {
        self.directory.ensemble()
    }

    pub fn services(&self) -> Vec<Service> {
        self.directory.services()
    }

    pub fn stats(&self) -> &FicStats {
        &self.stats
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Drains the services reported as new since the last call.
    pub fn take_new_services(&mut self) -> Vec<Service> {
        std::mem::take(&mut self.new_services)
    }

    /// Forgets all signaling, e.g. after a retune. The observer is not notified.
    pub fn reset(&mut self) {
        self.clear_signaling();
        self.publish();
    }

    /// Processes a whole number of FIBs, e.g. the FIC of one CIF.
    ///
    /// Broken FIBs and FIGs are skipped; other lengths are ignored.
    pub fn process(&mut self, data: &[u8]) {
        if data.len() % FIB_LEN != 0 {
            warn!("{}", FicError::NonIntegerFibCount(data.len()));
            return;
        }

        let mut changes = Changes::default();
        for fib in data.chunks_exact(FIB_LEN) {
            self.process_fib(fib, &mut changes);
        }

        if changes.is_empty() {
            return;
        }

        self.publish();

        if changes.ensemble {
            self.observer.fic_change_ensemble();
        }
        if !changes.removed.is_empty() {
            self.observer.fic_remove_services(&changes.removed);
        }
        if !changes.new_services.is_empty() {
            self.observer.fic_change_services(&changes.new_services);
            self.new_services.extend_from_slice(&changes.new_services);
        }
        for service in &changes.changed_services {
            self.observer.fic_change_service(service);
        }
    }

    fn publish(&self) {
        let mut directory = self.directory.lock();
        directory.ensemble = self.ensemble;
        directory.services = self.services.clone();
    }

    fn clear_signaling(&mut self) {
        self.ensemble = Ensemble::default();
        self.ensemble_info = None;
        self.subchannels.clear();
        self.fec_schemes.clear();
        self.audio_bindings.clear();
        self.labels.clear();
        self.last_seen.clear();
        self.services.clear();
        self.new_services.clear();
    }

    fn process_fib(&mut self, fib: &[u8], changes: &mut Changes) {
        if self.config.check_crc {
            if let Err((calculated, read)) = FIB_CRC.verify_trailing(fib) {
                debug!("{}", FicError::FibCrcMismatch { calculated, read });
                self.stats.fib_crc_errors += 1;
                return;
            }
        }

        let data = &fib[..FIB_DATA_LEN];
        let mut offset = 0;

        while offset < FIB_DATA_LEN && data[offset] != FIG_END_MARKER {
            let header = FigHeader::from(data[offset]);
            offset += 1;

            let remaining = FIB_DATA_LEN - offset;
            if header.len > remaining {
                debug!(
                    "{}",
                    FicError::FigTooLong {
                        fig_type: header.fig_type,
                        len: header.len,
                        remaining,
                    }
                );
                self.stats.fig_errors += 1;
                break;
            }

            let fig = &data[offset..offset + header.len];
            offset += header.len;

            self.stats.figs += 1;
            if let Err(e) = self.process_fig(header.fig_type, fig, changes) {
                debug!("FIG {}: {e}", header.fig_type);
                self.stats.fig_errors += 1;
            }
        }

        self.stats.fibs += 1;
        if self.config.cycle_fibs > 0 && self.stats.fibs % self.config.cycle_fibs == 0 {
            self.cycle += 1;
            self.remove_stale_services(changes);
        }
    }

    fn process_fig(&mut self, fig_type: u8, data: &[u8], changes: &mut Changes) -> Result<()> {
        if data.is_empty() {
            bail!(FicError::EmptyFig(fig_type));
        }

        match fig_type {
            0 => self.process_fig0(data, changes),
            1 => self.process_fig1(data, changes),
            _ => {
                trace!("FIG {fig_type} ignored");
                Ok(())
            }
        }
    }

    fn process_fig0(&mut self, data: &[u8], changes: &mut Changes) -> Result<()> {
        let header = Fig0Header::from(data[0]);
        if header.cn || header.oe || header.pd {
            trace!(
                "FIG 0/{} ignored (C/N {}, OE {}, P/D {})",
                header.extension, header.cn, header.oe, header.pd
            );
            return Ok(());
        }

        let reader = &mut BsIoSliceReader::from_slice(&data[1..]);
        match header.extension {
            0 => self.process_ensemble_info(EnsembleInfo::read(reader)?),
            1 => {
                while reader.available()? > 0 {
                    match SubchannelOrga::read(reader) {
                        Ok(orga) => self.process_subchannel(orga, changes),
                        // fixed size entry, the next one is still aligned
                        Err(e) if matches!(
                            e.downcast_ref::<FicError>(),
                            Some(FicError::ReservedTableSwitch(_))
                        ) =>
                        {
                            debug!("FIG 0/1: {e}");
                            self.stats.fig_errors += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            2 => {
                while reader.available()? > 0 {
                    let entry = ServiceEntry::read(reader)?;
                    self.process_service_entry(entry, changes);
                }
            }
            14 => {
                while reader.available()? > 0 {
                    let entry = FecEntry::read(reader)?;
                    self.process_fec(entry, changes);
                }
            }
            extension => trace!("FIG 0/{extension} ignored"),
        }

        Ok(())
    }

    fn process_fig1(&mut self, data: &[u8], changes: &mut Changes) -> Result<()> {
        let header = Fig1Header::from(data[0]);
        if header.oe {
            trace!("FIG 1/{} ignored (OE)", header.extension);
            return Ok(());
        }

        match header.extension {
            0 => {
                let record = LabelRecord::read(&header, &data[1..])?;
                self.process_ensemble_label(record, changes);
            }
            1 => {
                let record = LabelRecord::read(&header, &data[1..])?;
                self.process_service_label(record, changes);
            }
            extension => trace!("FIG 1/{extension} ignored"),
        }

        Ok(())
    }

    fn process_ensemble_info(&mut self, info: EnsembleInfo) {
        trace!(
            "FIG 0/0: EId {:#06X}, CIF count {}, change flags {:02b}",
            info.eid, info.cif_count, info.change_flags
        );

        let announced = self.ensemble_info.map(|i| i.change_flags);
        if info.change_flags != 0 && announced != Some(info.change_flags) {
            info!(
                "Ensemble reconfiguration announced (change flags {:02b}, occurrence change {:?})",
                info.change_flags, info.occurrence_change
            );
        }
        if info.alarm && !self.ensemble_info.is_some_and(|i| i.alarm) {
            info!("Ensemble alarm flag set");
        }

        self.ensemble_info = Some(info);
    }

    fn process_subchannel(&mut self, mut orga: SubchannelOrga, changes: &mut Changes) {
        orga.fec_scheme = self.fec_schemes.get(&orga.subchid).copied();
        if self.subchannels.get(&orga.subchid) == Some(&orga) {
            return;
        }

        debug!(
            "SubChId {:2}: start {} CUs, size {} CUs, {}, {} kbit/s",
            orga.subchid, orga.start_cu, orga.size_cu, orga.protection, orga.bitrate
        );
        self.subchannels.insert(orga.subchid, orga);
        self.refresh_subchannel_services(orga.subchid, changes);
    }

    fn process_fec(&mut self, entry: FecEntry, changes: &mut Changes) {
        if self.fec_schemes.insert(entry.subchid, entry.fec_scheme) == Some(entry.fec_scheme) {
            return;
        }

        debug!("SubChId {:2}: FEC scheme {}", entry.subchid, entry.fec_scheme);
        if let Some(orga) = self.subchannels.get_mut(&entry.subchid) {
            orga.fec_scheme = Some(entry.fec_scheme);
            self.refresh_subchannel_services(entry.subchid, changes);
        }
    }

    fn process_service_entry(&mut self, entry: ServiceEntry, changes: &mut Changes) {
        let sid = entry.sid;
        self.last_seen.insert(sid, self.cycle);

        for component in entry.components {
            let ServiceComponent::StreamAudio {
                ascty,
                subchid,
                primary,
                ca,
            } = component
            else {
                continue;
            };

            if !primary || ca || (ascty != ASCTY_DAB && ascty != ASCTY_DAB_PLUS) {
                continue;
            }

            let audio = AudioService {
                subchid,
                dab_plus: ascty == ASCTY_DAB_PLUS,
            };
            if self.audio_bindings.insert(sid, audio) != Some(audio) {
                debug!(
                    "SId {sid:#06X}: audio on SubChId {subchid:2} ({})",
                    if audio.dab_plus { "DAB+" } else { "DAB" }
                );
                self.refresh_service(sid, changes);
            }
        }
    }

    fn process_ensemble_label(&mut self, record: LabelRecord, changes: &mut Changes) {
        if self.ensemble.is_set() && self.ensemble.eid != record.id {
            info!(
                "Ensemble changed from {:#06X} to {:#06X}",
                self.ensemble.eid, record.id
            );
            self.clear_signaling();
            changes.new_services.clear();
            changes.changed_services.clear();
            changes.removed.clear();
        }

        if self.ensemble.eid == record.id && self.ensemble.label == Some(record.label) {
            return;
        }

        self.ensemble = Ensemble {
            eid: record.id,
            label: Some(record.label),
        };
        info!(
            "Ensemble {:#06X}: '{}' ('{}')",
            record.id,
            record.label.text().trim_end(),
            record.label.short_text()
        );
        changes.ensemble = true;
    }

    fn process_service_label(&mut self, record: LabelRecord, changes: &mut Changes) {
        if self.labels.insert(record.id, record.label) == Some(record.label) {
            return;
        }

        debug!(
            "SId {:#06X}: label '{}' ('{}')",
            record.id,
            record.label.text().trim_end(),
            record.label.short_text()
        );
        self.refresh_service(record.id, changes);
    }

    fn refresh_subchannel_services(&mut self, subchid: u8, changes: &mut Changes) {
        let sids: Vec<u16> = self
            .audio_bindings
            .iter()
            .filter(|(_, audio)| audio.subchid == subchid)
            .map(|(&sid, _)| sid)
            .collect();

        for sid in sids {
            self.refresh_service(sid, changes);
        }
    }

    /// Updates the directory entry of `sid` from the collected signaling.
    fn refresh_service(&mut self, sid: u16, changes: &mut Changes) {
        let Some(&audio) = self.audio_bindings.get(&sid) else {
            return;
        };
        let Some(&subchannel) = self.subchannels.get(&audio.subchid) else {
            return;
        };

        let service = Service {
            sid,
            subchannel,
            audio,
            label: self.labels.get(&sid).copied(),
        };

        match self.services.insert(sid, service) {
            None => {
                info!(
                    "New service {sid:#06X} '{}' on SubChId {}, {} kbit/s",
                    service.display_name(),
                    subchannel.subchid,
                    subchannel.bitrate
                );
                changes.add_new(service);
            }
            Some(old) if old != service => changes.add_changed(service),
            Some(_) => {}
        }
    }

    fn remove_stale_services(&mut self, changes: &mut Changes) {
        let stale_cycles = self.config.stale_cycles;
        if stale_cycles == 0 {
            return;
        }

        let cycle = self.cycle;
        let stale: Vec<u16> = self
            .last_seen
            .iter()
            .filter(|&(_, &seen)| cycle - seen > stale_cycles)
            .map(|(&sid, _)| sid)
            .collect();

        for sid in stale {
            self.last_seen.remove(&sid);
            self.audio_bindings.remove(&sid);
            self.labels.remove(&sid);
            self.new_services.retain(|s| s.sid != sid);

            if self.services.remove(&sid).is_some() {
                info!("Service {sid:#06X} no longer signaled, removed");
                changes.add_removed(sid);
            } else {
                trace!("Provisional binding of SId {sid:#06X} expired");
            }
        }
    }
}

#[cfg(test)]
mod fixtures {
    use super::FIB_CRC;
    use crate::structs::fig::{FIB_DATA_LEN, FIG_END_MARKER};

    /// A CRC-valid FIB holding `figs`.
    pub fn fib(figs: &[Vec<u8>]) -> Vec<u8> {
        let mut fib: Vec<u8> = figs.concat();
        assert!(fib.len() <= FIB_DATA_LEN);
        if fib.len() < FIB_DATA_LEN {
            fib.push(FIG_END_MARKER);
        }
        fib.resize(FIB_DATA_LEN, 0);

        let crc = FIB_CRC.checksum(&fib);
        fib.extend_from_slice(&crc.to_be_bytes());
        fib
    }

    pub fn fig0(extension: u8, body: &[u8]) -> Vec<u8> {
        let mut fig = vec![(body.len() + 1) as u8, extension];
        fig.extend_from_slice(body);
        fig
    }

    /// Short form FIG 0/1 entry.
    pub fn subchannel(subchid: u8, start_cu: u16, table_index: u8) -> Vec<u8> {
        fig0(
            1,
            &[
                subchid << 2 | (start_cu >> 8) as u8,
                start_cu as u8,
                table_index & 0x3F,
            ],
        )
    }

    /// FIG 0/2 with one primary stream audio component.
    pub fn service(sid: u16, ascty: u8, subchid: u8) -> Vec<u8> {
        let [sid_high, sid_low] = sid.to_be_bytes();
        fig0(2, &[sid_high, sid_low, 0x01, ascty & 0x3F, subchid << 2 | 0b10])
    }

    pub fn fec(subchid: u8, fec_scheme: u8) -> Vec<u8> {
        fig0(14, &[subchid << 2 | fec_scheme])
    }

    pub fn label(extension: u8, id: u16, text: &str, short_label_mask: u16) -> Vec<u8> {
        let mut fig = vec![1 << 5 | 21, extension];
        fig.extend_from_slice(&id.to_be_bytes());
        let mut field = [b' '; 16];
        field[..text.len()].copy_from_slice(text.as_bytes());
        fig.extend_from_slice(&field);
        fig.extend_from_slice(&short_label_mask.to_be_bytes());
        fig
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
struct Recorder {
    ensemble_changes: usize,
    batches: Vec<Vec<Service>>,
    changed: Vec<Service>,
    removed: Vec<Vec<u16>>,
}

#[cfg(test)]
impl FicDecoderObserver for Recorder {
    fn fic_change_ensemble(&mut self) {
        self.ensemble_changes += 1;
    }

    fn fic_change_services(&mut self, services: &[Service]) {
        self.batches.push(services.to_vec());
    }

    fn fic_change_service(&mut self, service: &Service) {
        self.changed.push(*service);
    }

    fn fic_remove_services(&mut self, sids: &[u16]) {
        self.removed.push(sids.to_vec());
    }
}

#[cfg(test)]
fn decoder() -> FicDecoder<Recorder> {
    FicDecoder::new(FicDecoderConfig::default(), Recorder::default())
}

#[test]
fn service_complete_in_any_order() {
    use fixtures::*;

    let orga = fib(&[subchannel(4, 0, 33)]);
    let binding = fib(&[service(0xD210, ASCTY_DAB_PLUS, 4)]);

    let mut orga_first = decoder();
    orga_first.process(&orga);
    assert!(orga_first.services().is_empty());
    orga_first.process(&binding);

    let mut binding_first = decoder();
    binding_first.process(&binding);
    assert!(binding_first.services().is_empty());
    binding_first.process(&orga);

    assert_eq!(orga_first.services(), binding_first.services());

    let services = orga_first.services();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].sid, 0xD210);
    assert_eq!(services[0].subchannel.bitrate, 128);
    assert!(services[0].audio.dab_plus);

    for decoder in [orga_first, binding_first] {
        assert_eq!(decoder.observer().batches, vec![services.clone()]);
        assert!(decoder.observer().changed.is_empty());
    }
}

#[test]
fn repeated_signaling_is_idempotent() {
    use fixtures::*;

    let mut decoder = decoder();
    let cif = [
        fib(&[subchannel(1, 0, 12), service(0xC001, ASCTY_DAB, 1)]),
        fib(&[label(1, 0xC001, "Classic", 0xFE00)]),
        fib(&[label(0, 0x10CE, "Mux", 0xE000)]),
    ]
    .concat();

    for _ in 0..5 {
        decoder.process(&cif);
    }

    let recorder = decoder.observer();
    assert_eq!(recorder.ensemble_changes, 1);
    assert_eq!(recorder.batches.len(), 1);
    // the label arrived in the same batch, no separate change
    assert_eq!(recorder.batches[0][0].display_name(), "Classic");
    assert!(recorder.changed.is_empty());
    assert_eq!(decoder.services().len(), 1);
    assert_eq!(decoder.stats().fibs, 15);
}

#[test]
fn labels_update_known_services() {
    use fixtures::*;

    let mut decoder = decoder();
    decoder.process(&fib(&[subchannel(2, 100, 40), service(0xD001, ASCTY_DAB_PLUS, 2)]));
    assert_eq!(decoder.services()[0].display_name(), "0xD001");

    decoder.process(&fib(&[label(1, 0xD001, "Jazz Radio", 0xF000)]));
    let recorder = decoder.observer();
    assert_eq!(recorder.batches.len(), 1);
    assert_eq!(recorder.changed.len(), 1);

    let jazz = recorder.changed[0].label.unwrap();
    assert_eq!(jazz.text().trim_end(), "Jazz Radio");
    assert_eq!(jazz.short_text(), "Jazz");
    assert_eq!(decoder.handle().service(0xD001).unwrap().label, Some(jazz));

    decoder.process(&fib(&[label(0, 0x10CE, "DAB Mux", 0xE000)]));
    let ensemble = decoder.ensemble();
    assert_eq!(ensemble.eid, 0x10CE);
    assert_eq!(ensemble.label.unwrap().short_text(), "DAB");
    assert_eq!(decoder.observer().ensemble_changes, 1);
}

#[test]
fn fec_scheme_is_merged() {
    use fixtures::*;

    let mut decoder = decoder();
    decoder.process(&fib(&[fec(3, 1)]));
    decoder.process(&fib(&[subchannel(3, 0, 24), service(0xD003, ASCTY_DAB_PLUS, 3)]));
    assert_eq!(decoder.services()[0].subchannel.fec_scheme, Some(1));

    decoder.process(&fib(&[fec(3, 0)]));
    assert_eq!(decoder.services()[0].subchannel.fec_scheme, Some(0));
    assert_eq!(decoder.observer().changed.len(), 1);
}

#[test]
fn ensemble_change_resets_directory() {
    use fixtures::*;

    let mut decoder = decoder();
    let handle = decoder.handle();
    decoder.process(
        &[
            fib(&[label(0, 0x1001, "First", 0xF800)]),
            fib(&[subchannel(1, 0, 12), service(0xD001, ASCTY_DAB_PLUS, 1)]),
        ]
        .concat(),
    );
    assert_eq!(handle.services().len(), 1);

    decoder.process(&fib(&[label(0, 0x1002, "Second", 0xFC00)]));
    assert_eq!(handle.ensemble().eid, 0x1002);
    assert!(handle.services().is_empty());
    assert_eq!(decoder.observer().ensemble_changes, 2);

    // the old subchannel organization is gone as well
    decoder.process(&fib(&[service(0xD001, ASCTY_DAB_PLUS, 1)]));
    assert!(handle.services().is_empty());

    // services of the old ensemble are no longer pending
    assert!(decoder.take_new_services().is_empty());
}

#[test]
fn reset_clears_everything() {
    use fixtures::*;

    let mut decoder = decoder();
    decoder.process(
        &[
            fib(&[label(0, 0x1001, "Mux", 0xE000)]),
            fib(&[subchannel(1, 0, 12), service(0xD001, ASCTY_DAB_PLUS, 1)]),
        ]
        .concat(),
    );
    assert_eq!(decoder.take_new_services().len(), 1);
    assert!(decoder.take_new_services().is_empty());

    decoder.reset();
    assert_eq!(decoder.handle().snapshot(), FicDirectory::default());
    assert!(!decoder.ensemble().is_set());

    decoder.process(&fib(&[service(0xD001, ASCTY_DAB_PLUS, 1)]));
    assert!(decoder.services().is_empty());
}

#[test]
fn broken_fibs_are_discarded() {
    use fixtures::*;

    let mut decoder = decoder();
    let mut broken = fib(&[subchannel(1, 0, 12), service(0xD001, ASCTY_DAB_PLUS, 1)]);
    broken[5] ^= 0x10;
    decoder.process(&broken);
    assert!(decoder.services().is_empty());
    assert_eq!(decoder.stats().fib_crc_errors, 1);
    assert_eq!(decoder.stats().fibs, 0);

    // not a whole number of FIBs
    decoder.process(&broken[..31]);
    assert_eq!(decoder.stats().fib_crc_errors, 1);

    let config = FicDecoderConfig {
        check_crc: false,
        ..Default::default()
    };
    let mut unchecked = FicDecoder::new(config, Recorder::default());
    let mut bad_crc = fib(&[subchannel(1, 0, 12), service(0xD001, ASCTY_DAB_PLUS, 1)]);
    bad_crc[31] ^= 0xFF;
    unchecked.process(&bad_crc);
    assert_eq!(unchecked.services().len(), 1);
}

#[test]
fn truncated_fig_keeps_earlier_figs() {
    use fixtures::*;

    let mut data = subchannel(1, 0, 12);
    // FIG 0 claiming 30 bytes where 24 remain
    data.extend_from_slice(&[0x1E, 0x02, 0xD0, 0x01]);
    let mut decoder = decoder();
    decoder.process(&fib(&[data]));
    assert_eq!(decoder.stats().fig_errors, 1);

    decoder.process(&fib(&[service(0xD001, ASCTY_DAB_PLUS, 1)]));
    assert_eq!(decoder.services().len(), 1);
}

#[test]
fn reserved_subchannel_entry_is_skipped() {
    use fixtures::*;

    // SubChId 2 with the reserved table switch, then a valid SubChId 1
    let orga = fig0(1, &[0x08, 0x00, 0b0100_0001, 0x04, 0x00, 12]);
    let mut decoder = decoder();
    decoder.process(&fib(&[orga, service(0xD001, ASCTY_DAB_PLUS, 1)]));

    let services = decoder.services();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].subchannel.subchid, 1);
    assert_eq!(decoder.stats().fig_errors, 1);
}

#[test]
fn flagged_and_unsupported_records_are_ignored() {
    use fixtures::*;

    let mut decoder = decoder();

    // next configuration and other ensemble
    let mut next = subchannel(1, 0, 12);
    next[1] |= 0x80;
    let mut other = service(0xD001, ASCTY_DAB_PLUS, 1);
    other[1] |= 0x40;
    // data service component (TMId 01), unknown ASCTy, secondary component
    let packet = fig0(2, &[0xD0, 0x02, 0x01, 0x40, 0x06]);
    let unknown_ascty = service(0xD003, 5, 1);
    let mut secondary = service(0xD004, ASCTY_DAB_PLUS, 1);
    secondary[6] &= !0b10;

    decoder.process(
        &[
            fib(&[next, other, packet]),
            fib(&[unknown_ascty, secondary]),
            fib(&[vec![0x41, 0x00], vec![0x61, 0x10]]),
            fib(&[subchannel(1, 0, 12)]),
        ]
        .concat(),
    );

    assert!(decoder.services().is_empty());
    assert_eq!(decoder.stats().fig_errors, 0);
}

#[test]
fn stale_services_are_removed() {
    use fixtures::*;

    let config = FicDecoderConfig {
        cycle_fibs: 4,
        stale_cycles: 2,
        ..Default::default()
    };
    let mut decoder = FicDecoder::new(config, Recorder::default());
    decoder.process(
        &[
            fib(&[subchannel(1, 0, 12), service(0xD001, ASCTY_DAB_PLUS, 1)]),
            fib(&[subchannel(2, 12, 12), service(0xD002, ASCTY_DAB_PLUS, 2)]),
        ]
        .concat(),
    );
    assert_eq!(decoder.services().len(), 2);

    // only 0xD002 keeps being signaled
    for _ in 0..20 {
        decoder.process(&fib(&[service(0xD002, ASCTY_DAB_PLUS, 2)]));
    }

    let services = decoder.services();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].sid, 0xD002);
    assert_eq!(decoder.observer().removed, vec![vec![0xD001]]);

    let pending: Vec<u16> = decoder.take_new_services().iter().map(|s| s.sid).collect();
    assert_eq!(pending, vec![0xD002]);

    // reappearing counts as new
    decoder.process(&fib(&[service(0xD001, ASCTY_DAB_PLUS, 1)]));
    assert_eq!(decoder.services().len(), 2);
    assert_eq!(decoder.observer().batches.len(), 2);
}

#[test]
fn readers_see_consistent_directory() -> anyhow::Result<()> {
    use fixtures::*;

    let mut decoder = decoder();
    let handle = decoder.handle();

    let reader = std::thread::spawn(move || {
        let mut max_services = 0;
        for _ in 0..1000 {
            let snapshot = handle.snapshot();
            for service in snapshot.services.values() {
                // a published service always carries its sub-channel
                assert_eq!(service.subchannel.subchid, service.audio.subchid);
            }
            max_services = max_services.max(snapshot.services.len());
        }
        max_services
    });

    for sid in 0..40u16 {
        let subchid = (sid % 60) as u8;
        decoder.process(
            &[
                fib(&[service(0xD000 + sid, ASCTY_DAB_PLUS, subchid)]),
                fib(&[subchannel(subchid, sid * 10, 12)]),
            ]
            .concat(),
        );
    }

    let max_services = reader
        .join()
        .map_err(|_| anyhow::anyhow!("reader thread panicked"))?;
    assert!(max_services <= 40);
    assert_eq!(decoder.services().len(), 40);
    Ok(())
}
