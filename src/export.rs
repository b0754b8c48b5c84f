use crate::record::HarvestRecord;
use anyhow::Result;
use chrono::Local;
use csv::Writer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

static UNSAFE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]").unwrap());

pub fn export_csv(records: &[HarvestRecord], output_path: &str) -> Result<()> {
    debug!("Exporting {} records to CSV: {}", records.len(), output_path);

    let file = File::create(output_path)?;
    let mut wtr = Writer::from_writer(file);
    write_csv_rows(records, &mut wtr)?;
    wtr.flush()?;

    info!("Successfully exported {} records to CSV: {}", records.len(), output_path);
    Ok(())
}

fn write_csv_rows<W: io::Write>(records: &[HarvestRecord], wtr: &mut Writer<W>) -> Result<()> {
    // Runs are homogeneous: contacts mode produces only contact records,
    // files mode only file links. The first record picks the schema.
    let contacts = matches!(records.first(), Some(HarvestRecord::Contact(_)));
    if contacts {
        wtr.write_record(["Name", "Email", "Source", "Title", "Query"])?;
    } else {
        wtr.write_record(["URL", "Source", "Query"])?;
    }

    for record in records {
        match record {
            HarvestRecord::Contact(c) => {
                wtr.write_record([
                    c.name.as_str(),
                    c.email.as_str(),
                    c.source.as_str(),
                    c.raw_title.as_str(),
                    c.origin_query.as_str(),
                ])?;
            }
            HarvestRecord::FileLink(f) => {
                wtr.write_record([f.url.as_str(), f.source.as_str(), f.origin_query.as_str()])?;
            }
        }
    }
    Ok(())
}

pub fn export_json(records: &[HarvestRecord], output_path: &str) -> Result<()> {
    debug!("Exporting {} records to JSON: {}", records.len(), output_path);

    let json_output = JsonExport {
        summary: ExportSummary {
            total_records: records.len(),
            contacts: records
                .iter()
                .filter(|r| matches!(r, HarvestRecord::Contact(_)))
                .count(),
            file_links: records
                .iter()
                .filter(|r| matches!(r, HarvestRecord::FileLink(_)))
                .count(),
            sources: records
                .iter()
                .map(|r| r.source().as_str().to_string())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect(),
        },
        records: records.to_vec(),
    };

    let json_string = serde_json::to_string_pretty(&json_output)?;

    let mut file = File::create(output_path)?;
    file.write_all(json_string.as_bytes())?;

    info!("Successfully exported {} records to JSON: {}", records.len(), output_path);
    Ok(())
}

#[derive(serde::Serialize)]
struct JsonExport {
    summary: ExportSummary,
    records: Vec<HarvestRecord>,
}

#[derive(serde::Serialize)]
struct ExportSummary {
    total_records: usize,
    contacts: usize,
    file_links: usize,
    sources: Vec<String>,
}

/// Plain-text export: one email or URL per line.
pub fn export_txt(records: &[HarvestRecord], output_path: &str) -> Result<()> {
    let mut file = File::create(output_path)?;
    for record in records {
        writeln!(file, "{}", record.content())?;
    }
    info!("Successfully exported {} records to: {}", records.len(), output_path);
    Ok(())
}

/// Dispatch on the output format name; anything unrecognized falls back
/// to plain text.
pub fn export_records(records: &[HarvestRecord], output_path: &str, format: &str) -> Result<()> {
    match format {
        "json" => export_json(records, output_path),
        "csv" => export_csv(records, output_path),
        _ => export_txt(records, output_path),
    }
}

/// Write records to stdout in the selected format, for piping into other
/// tools.
pub fn write_to_stdout(records: &[HarvestRecord], format: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(records)?;
            writeln!(handle, "{}", json)?;
        }
        "csv" => {
            let mut wtr = Writer::from_writer(&mut handle);
            write_csv_rows(records, &mut wtr)?;
            wtr.flush()?;
        }
        _ => {
            for record in records {
                writeln!(handle, "{}", record.content())?;
            }
        }
    }
    Ok(())
}

/// Names of extracted contacts, one per line, for feeding other tooling.
pub fn export_names(records: &[HarvestRecord], output_path: &Path) -> Result<()> {
    let mut file = File::create(output_path)?;
    for record in records {
        if let HarvestRecord::Contact(c) = record {
            writeln!(file, "{}", c.name)?;
        }
    }
    Ok(())
}

/// Raw result titles, kept alongside contact output for manual review.
pub fn export_raw_titles(records: &[HarvestRecord], output_path: &Path) -> Result<()> {
    let mut file = File::create(output_path)?;
    for record in records {
        writeln!(file, "{}", record.raw_title())?;
    }
    Ok(())
}

/// Create a timestamped run directory under `base`:
/// `<base>/<YYYY-MM-DD_HHMMSS>_<kind>_<label>/`.
pub fn make_run_dir(base: &Path, kind: &str, label: &str) -> Result<PathBuf> {
    let ts = Local::now().format("%Y-%m-%d_%H%M%S");
    let safe_label: String = UNSAFE_LABEL
        .replace_all(label, "_")
        .chars()
        .take(40)
        .collect();
    let dir = base.join(format!("{}_{}_{}", ts, kind, safe_label));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn write_run_log(run_dir: &Path, lines: &[String]) -> Result<()> {
    let mut file = File::create(run_dir.join("run.log"))?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ContactRecord, FileLinkRecord, SourceTag};
    use tempfile::TempDir;

    fn contact(name: &str, email: &str) -> HarvestRecord {
        HarvestRecord::Contact(ContactRecord {
            name: name.to_string(),
            email: email.to_string(),
            first: name.split(' ').next().unwrap_or("").to_lowercase(),
            last: name.split(' ').nth(1).unwrap_or("").to_lowercase(),
            raw_title: format!("{} - Engineer", name),
            source: SourceTag::Api,
            origin_query: "q1".to_string(),
        })
    }

    fn file_link(url: &str) -> HarvestRecord {
        HarvestRecord::FileLink(FileLinkRecord {
            url: url.to_string(),
            source: SourceTag::Browser,
            origin_query: "q2".to_string(),
        })
    }

    #[test]
    fn txt_export_is_one_content_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("emails.txt");
        let records = vec![
            contact("John Doe", "john.doe@acme.com"),
            contact("Jane Roe", "jane.roe@acme.com"),
        ];
        export_txt(&records, path.to_str().unwrap()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "john.doe@acme.com\njane.roe@acme.com\n");
    }

    #[test]
    fn json_export_round_trips_with_summary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let records = vec![contact("John Doe", "john.doe@acme.com"), file_link("https://x.com/a.pdf")];
        export_json(&records, path.to_str().unwrap()).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["summary"]["total_records"], 2);
        assert_eq!(parsed["summary"]["contacts"], 1);
        assert_eq!(parsed["summary"]["file_links"], 1);
        assert_eq!(parsed["records"][0]["email"], "john.doe@acme.com");
    }

    #[test]
    fn csv_export_uses_contact_schema_for_contacts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        export_csv(&[contact("John Doe", "john.doe@acme.com")], path.to_str().unwrap()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "Name,Email,Source,Title,Query");
        assert!(lines.next().unwrap().starts_with("John Doe,john.doe@acme.com,api"));
    }

    #[test]
    fn csv_export_uses_url_schema_for_file_links() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        export_csv(&[file_link("https://x.com/a.pdf")], path.to_str().unwrap()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("URL,Source,Query\n"));
        assert!(content.contains("https://x.com/a.pdf,browser,q2"));
    }

    #[test]
    fn run_dir_sanitizes_label() {
        let dir = TempDir::new().unwrap();
        let run_dir = make_run_dir(dir.path(), "contacts", "Acme Corp / EU").unwrap();
        assert!(run_dir.exists());
        let name = run_dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains("_contacts_Acme_Corp___EU"));
        assert!(!name.contains('/'));
        assert!(!name.contains(' '));
    }

    #[test]
    fn run_log_is_written() {
        let dir = TempDir::new().unwrap();
        write_run_log(dir.path(), &["line one".to_string(), "line two".to_string()]).unwrap();
        let content = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert_eq!(content, "line one\nline two\n");
    }
}
