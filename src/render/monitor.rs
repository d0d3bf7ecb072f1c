use std::collections::HashMap;
use std::ffi::CString;
use std::io::Write;
use std::os::raw::{ c_char, c_uint, c_void };
use std::time::{ Duration, Instant };
use parking_lot::Mutex;

/// Abstract progress display. The render core only ever talks to this
/// trait; new targets are added without touching render code.
pub trait ProgressBar: Send {
    fn init(&mut self, steps_total: usize);
    fn update(&mut self, steps_increment: usize);
    fn set_tag(&mut self, tag: &str);
    fn tag(&self) -> String;
    fn done(&mut self);
    fn percent(&self) -> f32;
}

/// In-place console bar, the default target
pub struct ConsoleProgressBar {
    bar_len: usize,
    steps_total: usize,
    steps_done: usize,
    last_bar_len: usize,
    tag: String,
}

impl ConsoleProgressBar {
    pub fn new(console_width: usize) -> ConsoleProgressBar {
        ConsoleProgressBar {
            bar_len: console_width.saturating_sub(22).max(10),
            steps_total: 0,
            steps_done: 0,
            last_bar_len: 0,
            tag: String::new(),
        }
    }

    fn print(&self, full: usize, percent: usize) {
        let mut out = std::io::stdout();
        let _ = write!(out, "\rProgress: [{}{}] ({}%)",
            "#".repeat(full), " ".repeat(self.bar_len - full), percent);
        let _ = out.flush();
    }
}

impl Default for ConsoleProgressBar {
    fn default() -> ConsoleProgressBar {
        ConsoleProgressBar::new(80)
    }
}

impl ProgressBar for ConsoleProgressBar {
    fn init(&mut self, steps_total: usize) {
        self.steps_total = steps_total;
        self.steps_done = 0;
        self.last_bar_len = 0;
        self.print(0, 0);
    }

    fn update(&mut self, steps_increment: usize) {
        self.steps_done += steps_increment;
        if self.steps_total == 0 { return }
        let progress = self.steps_done.min(self.steps_total) as f64 / self.steps_total as f64;
        let bar_len = (self.bar_len as f64 * progress) as usize;
        if bar_len > self.last_bar_len {
            self.print(bar_len.min(self.bar_len), (progress * 100.0) as usize);
        }
        self.last_bar_len = bar_len;
    }

    fn set_tag(&mut self, tag: &str) {
        self.tag = tag.to_string();
    }

    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn done(&mut self) {
        self.steps_done = self.steps_total;
        self.print(self.bar_len, 100);
        let mut out = std::io::stdout();
        let _ = writeln!(out);
    }

    fn percent(&self) -> f32 {
        if self.steps_total == 0 { return 0.0 }
        100.0 * self.steps_done.min(self.steps_total) as f32 / self.steps_total as f32
    }
}

/// C-ABI progress callback: (steps_total, steps_done, tag, user_data).
/// Invoked from the driver thread only.
pub type ProgressCallback =
    extern "C" fn(steps_total: c_uint, steps_done: c_uint, tag: *const c_char, user_data: *mut c_void);

/// Delegates every progress event to an external callback
pub struct CallbackProgressBar {
    callback: ProgressCallback,
    user_data: *mut c_void,
    steps_total: usize,
    steps_done: usize,
    tag: CString,
}

// The callback owner promises the user_data pointer is safe to use from
// whichever single thread drives the monitor.
unsafe impl Send for CallbackProgressBar {}

impl CallbackProgressBar {
    pub fn new(callback: ProgressCallback, user_data: *mut c_void) -> CallbackProgressBar {
        CallbackProgressBar {
            callback,
            user_data,
            steps_total: 0,
            steps_done: 0,
            tag: CString::default(),
        }
    }

    fn emit(&self) {
        (self.callback)(
            self.steps_total as c_uint,
            self.steps_done as c_uint,
            self.tag.as_ptr(),
            self.user_data,
        );
    }
}

impl ProgressBar for CallbackProgressBar {
    fn init(&mut self, steps_total: usize) {
        self.steps_total = steps_total;
        self.steps_done = 0;
        self.emit();
    }

    fn update(&mut self, steps_increment: usize) {
        self.steps_done += steps_increment;
        self.emit();
    }

    fn set_tag(&mut self, tag: &str) {
        self.tag = CString::new(tag).unwrap_or_default();
        self.emit();
    }

    fn tag(&self) -> String {
        self.tag.to_string_lossy().into_owned()
    }

    fn done(&mut self) {
        self.steps_done = self.steps_total;
        self.emit();
    }

    fn percent(&self) -> f32 {
        if self.steps_total == 0 { return 0.0 }
        100.0 * self.steps_done.min(self.steps_total) as f32 / self.steps_total as f32
    }
}

/// Quiet target for library use and tests
#[derive(Default)]
pub struct SilentProgressBar {
    steps_total: usize,
    steps_done: usize,
    tag: String,
}

impl ProgressBar for SilentProgressBar {
    fn init(&mut self, steps_total: usize) {
        self.steps_total = steps_total;
        self.steps_done = 0;
    }

    fn update(&mut self, steps_increment: usize) {
        self.steps_done += steps_increment;
    }

    fn set_tag(&mut self, tag: &str) {
        self.tag = tag.to_string();
    }

    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn done(&mut self) {
        self.steps_done = self.steps_total;
    }

    fn percent(&self) -> f32 {
        if self.steps_total == 0 { return 0.0 }
        100.0 * self.steps_done.min(self.steps_total) as f32 / self.steps_total as f32
    }
}

#[derive(Default)]
struct TimerEvent {
    started: Option<Instant>,
    accumulated: Duration,
}

struct MonitorInner {
    bar: Box<dyn ProgressBar>,
    timers: HashMap<String, TimerEvent>,
    total_passes: u32,
    current_pass: u32,
}

/// Thread-safe progress aggregation for one render: a progress bar, a pass
/// counter and a set of named timers, all behind a single mutex.
pub struct RenderMonitor {
    inner: Mutex<MonitorInner>,
}

impl RenderMonitor {
    pub fn new(bar: Box<dyn ProgressBar>) -> RenderMonitor {
        RenderMonitor {
            inner: Mutex::new(MonitorInner {
                bar,
                timers: HashMap::new(),
                total_passes: 0,
                current_pass: 0,
            }),
        }
    }

    pub fn silent() -> RenderMonitor {
        RenderMonitor::new(Box::new(SilentProgressBar::default()))
    }

    pub fn set_total_passes(&self, passes: u32) {
        self.inner.lock().total_passes = passes;
    }

    pub fn set_current_pass(&self, pass: u32) {
        self.inner.lock().current_pass = pass;
    }

    pub fn total_passes(&self) -> u32 {
        self.inner.lock().total_passes
    }

    pub fn current_pass(&self) -> u32 {
        self.inner.lock().current_pass
    }

    pub fn init_progress(&self, steps_total: usize) {
        self.inner.lock().bar.init(steps_total);
    }

    pub fn update_progress(&self, steps_increment: usize) {
        self.inner.lock().bar.update(steps_increment);
    }

    pub fn set_tag(&self, tag: &str) {
        self.inner.lock().bar.set_tag(tag);
    }

    pub fn tag(&self) -> String {
        self.inner.lock().bar.tag()
    }

    pub fn done(&self) {
        self.inner.lock().bar.done();
    }

    pub fn percent(&self) -> f32 {
        self.inner.lock().bar.percent()
    }

    /// Start (or restart) the named timer event
    pub fn timer_start(&self, name: &str) {
        let mut inner = self.inner.lock();
        let event = inner.timers.entry(name.to_string()).or_default();
        event.started = Some(Instant::now());
    }

    /// Stop the named timer, folding the elapsed time into its total
    pub fn timer_stop(&self, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(event) = inner.timers.get_mut(name) {
            if let Some(started) = event.started.take() {
                event.accumulated += started.elapsed();
            }
        }
    }

    /// Accumulated seconds for the named timer, including a running interval
    pub fn timer_seconds(&self, name: &str) -> f64 {
        let inner = self.inner.lock();
        match inner.timers.get(name) {
            Some(event) => {
                let mut total = event.accumulated;
                if let Some(started) = event.started {
                    total += started.elapsed();
                }
                total.as_secs_f64()
            }
            None => 0.0,
        }
    }
}
