use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Only show progress bar and final summary
    Summary = 1,  // High-level harvest progress (default)
    Detailed = 2, // Detailed steps, results, warnings
    Debug = 3,    // All messages including debug info and errors
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// Console logger that cooperates with an active progress bar and
/// optionally buffers everything for a run-directory log file.
#[derive(Clone)]
pub struct HarvestLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<Mutex<Option<ProgressBar>>>,
    run_metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
}

#[derive(Default, Clone)]
struct RunMetadata {
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    queries_run: usize,
    pages_fetched: usize,
    records_found: usize,
    api_credits_used: u64,
    output_file: String,
}

impl HarvestLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(Mutex::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(Mutex::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: Some(log_file_path),
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    /// Errors are shown regardless of verbosity.
    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let timestamp = self.get_timestamp();
        let msg = format!("[{}] {}: {}", timestamp, level, message);

        // Store in log buffer if log file export is enabled
        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Route through the progress bar so the bar keeps its position
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    fn get_timestamp(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs = now.as_secs();
        let millis = now.subsec_millis();

        let hours = (secs / 3600) % 24;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    }

    pub fn start_progress(&self, total_steps: u64, message: &str) {
        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| {
                    ProgressStyle::default_bar()
                        .template("{bar:40} {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                })
                .progress_chars("##-"),
        );
        pb.set_message(message.to_string());

        if let Ok(mut guard) = self.progress_bar.lock() {
            *guard = Some(pb);
        }

        let mut metadata = self.run_metadata.lock().expect("metadata lock poisoned");
        if metadata.start_time.is_none() {
            metadata.start_time = Some(SystemTime::now());
        }
    }

    pub fn update_progress(&self, message: &str) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(message.to_string());
            }
        }
    }

    pub fn advance_progress(&self) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.inc(1);
            }
        }
    }

    pub fn finish_progress(&self) {
        if let Ok(mut guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
        let mut metadata = self.run_metadata.lock().expect("metadata lock poisoned");
        metadata.end_time = Some(SystemTime::now());
    }

    pub fn record_query_completed(&self) {
        let mut metadata = self.run_metadata.lock().expect("metadata lock poisoned");
        metadata.queries_run += 1;
    }

    pub fn record_page_fetched(&self) {
        let mut metadata = self.run_metadata.lock().expect("metadata lock poisoned");
        metadata.pages_fetched += 1;
    }

    pub fn record_records_found(&self, count: usize) {
        let mut metadata = self.run_metadata.lock().expect("metadata lock poisoned");
        metadata.records_found = count;
    }

    pub fn record_api_credits(&self, credits: u64) {
        let mut metadata = self.run_metadata.lock().expect("metadata lock poisoned");
        metadata.api_credits_used = credits;
    }

    pub fn record_output_file(&self, path: &str) {
        let mut metadata = self.run_metadata.lock().expect("metadata lock poisoned");
        metadata.output_file = path.to_string();
    }

    pub fn print_final_summary(&self) {
        let mut metadata = self.run_metadata.lock().expect("metadata lock poisoned");
        if metadata.end_time.is_none() {
            metadata.end_time = Some(SystemTime::now());
        }

        // Clear any remaining progress bar artifacts
        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== HARVEST SUMMARY ===");
        if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
            let duration = end.duration_since(start).unwrap_or_default();
            println!("Duration: {:.2}s", duration.as_secs_f64());
        }
        println!("Queries Run: {}", metadata.queries_run);
        println!("Pages Fetched: {}", metadata.pages_fetched);
        println!("Unique Records: {}", metadata.records_found);
        if metadata.api_credits_used > 0 {
            println!("API Credits Used: {}", metadata.api_credits_used);
        }
        if !metadata.output_file.is_empty() {
            println!("Results Exported: {}", metadata.output_file);
        }
        println!("=======================\n");
    }

    /// Export all collected logs to the specified file
    pub fn export_logs(&self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref log_file_path) = self.log_file_path {
            if let Ok(buffer) = self.log_buffer.lock() {
                if let Some(parent) = Path::new(log_file_path).parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(log_file_path)?;

                for log_entry in buffer.iter() {
                    writeln!(file, "{}", log_entry)?;
                }

                file.flush()?;
                return Ok(());
            }
        }
        Ok(())
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}
