use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Number of whole records of `record_len` bytes in an input of `size` bytes.
pub fn estimate_total_records(size: Option<u64>, record_len: usize) -> Option<u64> {
    let total = size? / record_len as u64;
    log::debug!("Expecting {total} records of {record_len} bytes");
    Some(total)
}

pub fn create_progress_bar(
    multi: &MultiProgress,
    total: Option<u64>,
    unit: &str,
) -> Result<ProgressBar> {
    let pb = if let Some(total) = total {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(&format!(
            "{{bar:40.cyan/blue}} {{pos}}/{{len}} {unit} ({{percent}}%)\n{{msg}} | elapsed: {{elapsed_precise}} | ETA: {{eta_precise}}"
        ))?);

        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(&format!(
            "{{spinner:.green}} {{pos}} {unit}\n{{msg}} | elapsed: {{elapsed_precise}}"
        ))?);

        pb
    };
    pb.set_message("waiting for input");
    Ok(pb)
}

pub fn finish_progress_bar(pb: &Option<ProgressBar>, message: String) {
    if let Some(pb) = pb {
        pb.finish_with_message(message);
    }
}

#[test]
fn record_estimate() {
    assert_eq!(estimate_total_records(Some(1000), 288), Some(3));
    assert_eq!(estimate_total_records(None, 32), None);
}
