use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Gauge, Paragraph},
};
use std::{
    io::{self, Stdout},
    time::{Duration, Instant},
};

use pulsefield::{AnalyzerState, Metrics, SpectralAnalyzer};

/// Display gain applied to band energies before drawing the gauges.
const METER_GAIN: f32 = 4.0;

/// Spectrum bars span this dB range (magnitudes are normalized by FFT size).
const SPECTRUM_FLOOR_DB: f32 = -72.0;
const SPECTRUM_RANGE_DB: f32 = 60.0;

/// Lowest frequency on the spectrum axis.
const AXIS_LOW_HZ: f32 = 20.0;

/// Base colours for bass, mids and highs; meters and spectrum bars share them.
const BAND_COLORS: [(u8, u8, u8); 3] = [(255, 112, 64), (128, 224, 160), (96, 160, 255)];
const AMPLITUDE_COLOR: (u8, u8, u8) = (224, 224, 224);
const OFF_BAND_COLOR: (u8, u8, u8) = (112, 112, 112);

const BORDER: Color = Color::Rgb(96, 160, 192);
const LABEL: Color = Color::Rgb(128, 160, 192);
const KEY: Color = Color::Rgb(255, 255, 0);

pub struct App {
    pub should_quit: bool,
    pub metrics: Metrics,
    pub spectrum: Vec<f32>,
    pub state: AnalyzerState,
    pub capturing: bool,
    pub beat_flash: f32,
    pub sample_rate: f32,
    pub fft_size: usize,
    pub device_name: String,
    pub device_error: Option<String>,
    /// Bass, mids and highs ranges in Hz.
    pub bands: [(f32, f32); 3],
    last_refresh: Instant,
}

impl App {
    pub fn new(analyzer: &SpectralAnalyzer) -> App {
        App {
            should_quit: false,
            metrics: Metrics::default(),
            spectrum: Vec::new(),
            state: analyzer.state(),
            capturing: false,
            beat_flash: 0.0,
            sample_rate: analyzer.sample_rate(),
            fft_size: analyzer.fft_size(),
            device_name: analyzer.device_name(),
            device_error: None,
            bands: {
                let config = analyzer.config();
                [config.bass_range_hz, config.mids_range_hz, config.highs_range_hz]
            },
            last_refresh: Instant::now(),
        }
    }

    /// Pull the latest values from the analyzer after its `update`.
    pub fn refresh(&mut self, analyzer: &SpectralAnalyzer) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_refresh).as_secs_f32();
        self.last_refresh = now;

        self.metrics = analyzer.metrics();
        self.state = analyzer.state();
        self.capturing = analyzer.is_capturing();
        if self.state == AnalyzerState::Running {
            self.spectrum = analyzer.spectrum();
        }

        if self.metrics.beat {
            self.beat_flash = 1.0;
        } else {
            self.decay_beat_flash(dt);
        }
    }

    pub fn decay_beat_flash(&mut self, dt: f32) {
        let decay_per_sec = 0.02f32;
        self.beat_flash *= decay_per_sec.powf(dt);
    }
}

pub type TerminalType = Terminal<CrosstermBackend<Stdout>>;

pub fn init_terminal() -> Result<TerminalType, anyhow::Error> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

pub fn restore_terminal() -> Result<(), anyhow::Error> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)?;
    Ok(())
}

pub fn handle_events(app: &mut App, analyzer: &mut SpectralAnalyzer) -> Result<(), anyhow::Error> {
    if event::poll(Duration::from_millis(0))? {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        app.should_quit = true;
                    }
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.should_quit = true;
                    }
                    KeyCode::Char('p') | KeyCode::Char(' ') => {
                        analyzer.toggle_pause();
                        app.state = analyzer.state();
                    }
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        if analyzer.state() == AnalyzerState::Stopped {
                            app.device_error = analyzer.start().err().map(|e| e.to_string());
                        }
                        app.state = analyzer.state();
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Scale a band colour by meter level; silent meters stay dimly visible.
fn level_color((r, g, b): (u8, u8, u8), level: f32) -> Color {
    let k = 1.0 - 0.7 * (1.0 - level.clamp(0.0, 1.0));
    Color::Rgb(
        (r as f32 * k) as u8,
        (g as f32 * k) as u8,
        (b as f32 * k) as u8,
    )
}

/// Colour of the band containing `freq`, or grey outside every band.
fn band_color(bands: &[(f32, f32); 3], freq: f32) -> (u8, u8, u8) {
    bands
        .iter()
        .position(|&(low, high)| freq >= low && freq < high)
        .map_or(OFF_BAND_COLOR, |i| BAND_COLORS[i])
}

fn axis_high_hz(sample_rate: f32) -> f32 {
    (sample_rate / 2.0).min(20_000.0)
}

/// Position of `freq` on the log axis, in `[0, 1]`.
fn axis_position(freq: f32, sample_rate: f32) -> f32 {
    let f_hi = axis_high_hz(sample_rate);
    let f = freq.max(AXIS_LOW_HZ);
    ((f / AXIS_LOW_HZ).ln() / (f_hi / AXIS_LOW_HZ).ln()).clamp(0.0, 1.0)
}

fn axis_frequency(t: f32, sample_rate: f32) -> f32 {
    AXIS_LOW_HZ * (axis_high_hz(sample_rate) / AXIS_LOW_HZ).powf(t)
}

pub fn draw_ui(f: &mut Frame, app: &App) {
    let size = f.area();

    if size.width < 40 || size.height < 22 {
        let error_msg = Paragraph::new("Terminal too small!\nMinimum: 40x22")
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(error_msg, size);
        return;
    }

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title + beat
            Constraint::Length(6), // Band meters
            Constraint::Min(8),    // Spectrum
            Constraint::Length(3), // Frequency labels
            Constraint::Length(4), // Status bar
        ])
        .split(size);

    draw_title(f, main_layout[0], app);
    draw_band_meters(f, main_layout[1], app);
    draw_spectrum(f, main_layout[2], app);
    draw_frequency_labels(f, main_layout[3], app);
    draw_status_bar(f, main_layout[4], app);
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let flash = (app.beat_flash * 255.0) as u8;
    let beat_style = Style::default()
        .fg(Color::Rgb(flash, flash / 3, flash / 2))
        .add_modifier(Modifier::BOLD);

    let title = Paragraph::new(Line::from(vec![
        Span::styled(
            "pulsefield ",
            Style::default()
                .fg(Color::Rgb(128, 224, 208))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("● BEAT", beat_style),
    ]))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(BORDER)),
    );
    f.render_widget(title, area);
}

fn draw_band_meters(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(" Bands ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1); 4])
        .split(inner);

    let m = &app.metrics;
    for (row, (name, value, color)) in rows.iter().zip([
        ("Bass ", m.bass, BAND_COLORS[0]),
        ("Mids ", m.mids, BAND_COLORS[1]),
        ("Highs", m.highs, BAND_COLORS[2]),
        ("Amp  ", m.amplitude, AMPLITUDE_COLOR),
    ]) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(16), Constraint::Min(1)])
            .split(*row);

        let label = Paragraph::new(format!("{name} {value:>8.4}"))
            .style(Style::default().fg(Color::Rgb(200, 200, 200)));
        f.render_widget(label, cols[0]);

        let level = (value * METER_GAIN).clamp(0.0, 1.0);
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(level_color(color, level)))
            .ratio(level as f64)
            .label("");
        f.render_widget(gauge, cols[1]);
    }
}

/// Average the spectrum into `bars` log-spaced groups between 20 Hz and
/// min(Nyquist, 20 kHz), returning levels in `[0, 1]`.
fn spectrum_bars(spectrum: &[f32], sample_rate: f32, fft_size: usize, bars: usize) -> Vec<f32> {
    if spectrum.is_empty() || bars == 0 {
        return Vec::new();
    }

    let bin_hz = sample_rate / fft_size as f32;

    let mut power = vec![0.0f32; bars];
    let mut count = vec![0u32; bars];
    for (bin, mag) in spectrum.iter().enumerate().skip(1) {
        let t = axis_position(bin as f32 * bin_hz, sample_rate);
        let b = ((t * (bars as f32 - 1.0)).round() as usize).min(bars - 1);
        power[b] += mag * mag;
        count[b] += 1;
    }

    power
        .iter()
        .zip(&count)
        .map(|(&p, &n)| {
            if n == 0 || p <= 0.0 {
                return 0.0;
            }
            let db = 10.0 * (p / n as f32).log10();
            ((db - SPECTRUM_FLOOR_DB) / SPECTRUM_RANGE_DB).clamp(0.0, 1.0)
        })
        .collect()
}

fn draw_spectrum(f: &mut Frame, area: Rect, app: &App) {
    let title = match app.state {
        AnalyzerState::Paused => " Spectrum (paused) ",
        _ => " Spectrum ",
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));

    if app.spectrum.is_empty() {
        let text = match &app.device_error {
            Some(err) => format!("No audio input: {err}\nPress R to retry"),
            None => "Waiting for audio data...".to_string(),
        };
        let waiting = Paragraph::new(text)
            .style(Style::default().fg(Color::Rgb(128, 128, 128)))
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(waiting, area);
        return;
    }

    let inner = block.inner(area);
    f.render_widget(block, area);

    let max_bars = (inner.width as usize).saturating_sub(2) / 2;
    let levels = spectrum_bars(&app.spectrum, app.sample_rate, app.fft_size, max_bars);

    let last = levels.len().saturating_sub(1).max(1) as f32;
    let bars: Vec<Bar> = levels
        .iter()
        .enumerate()
        .map(|(i, &level)| {
            let freq = axis_frequency(i as f32 / last, app.sample_rate);
            let color = band_color(&app.bands, freq);
            Bar::default()
                .value((level * 100.0) as u64)
                .text_value(String::new())
                .style(Style::default().fg(level_color(color, level)))
        })
        .collect();

    let barchart = BarChart::default()
        .block(Block::default())
        .data(BarGroup::default().bars(&bars))
        .bar_width(1)
        .bar_gap(1)
        .max(100);

    f.render_widget(barchart, inner);
}

/// Marks where each band starts on the spectrum axis, plus the axis top.
fn draw_frequency_labels(f: &mut Frame, area: Rect, app: &App) {
    let label_block = Block::default()
        .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = label_block.inner(area);
    f.render_widget(label_block, area);
    if inner.width < 2 {
        return;
    }

    let names = ["bass", "mids", "highs"];
    let mut marks: Vec<(f32, String, (u8, u8, u8))> = app
        .bands
        .iter()
        .zip(names)
        .zip(BAND_COLORS)
        .map(|((&(low, _), name), color)| (low, format!("{name} {}", format_hz(low)), color))
        .collect();
    let f_hi = axis_high_hz(app.sample_rate);
    marks.push((f_hi, format_hz(f_hi), OFF_BAND_COLOR));

    // Left to right; a label that would overlap its neighbour is skipped.
    let mut next_free = 0u16;
    for (freq, text, color) in marks {
        let width = (text.len() as u16).min(inner.width);
        let pos = (axis_position(freq, app.sample_rate) * (inner.width - 1) as f32) as u16;
        let x = pos.min(inner.width - width);
        if x < next_free {
            continue;
        }
        next_free = x + width + 1;

        let label_area = Rect {
            x: inner.x + x,
            y: inner.y,
            width,
            height: 1,
        };
        let label = Paragraph::new(text).style(Style::default().fg(level_color(color, 1.0)));
        f.render_widget(label, label_area);
    }
}

fn format_hz(freq: f32) -> String {
    if freq >= 1000.0 {
        format!("{:.0}k", freq / 1000.0)
    } else {
        format!("{freq:.0}")
    }
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let (state_text, state_color) = match (app.state, app.capturing) {
        (AnalyzerState::Running, true) => ("live", Color::Rgb(128, 224, 160)),
        (AnalyzerState::Running, false) => ("device lost", Color::Red),
        (AnalyzerState::Paused, _) => ("paused", Color::Rgb(255, 200, 64)),
        (AnalyzerState::Stopped, _) => ("stopped", Color::Red),
    };

    let key = |k: &'static str| {
        Span::styled(k, Style::default().fg(KEY).add_modifier(Modifier::BOLD))
    };
    let text = |t: &'static str| Span::styled(t, Style::default().fg(Color::White));

    let status_text = vec![
        Line::from(vec![
            Span::styled("Device: ", Style::default().fg(LABEL)),
            Span::styled(app.device_name.clone(), Style::default().fg(Color::White)),
            Span::styled(" | ", Style::default().fg(LABEL)),
            Span::styled(
                format!("{:.0} Hz / FFT {}", app.sample_rate, app.fft_size),
                Style::default().fg(Color::White),
            ),
            Span::styled(" | ", Style::default().fg(LABEL)),
            Span::styled(state_text, Style::default().fg(state_color)),
        ]),
        Line::from(vec![
            key("Q"),
            text(" quit  "),
            key("P"),
            text(" pause  "),
            key("R"),
            text(" retry device"),
        ]),
    ];

    let status = Paragraph::new(status_text).alignment(Alignment::Center);
    f.render_widget(status, inner);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectrum_bars_levels_in_range() {
        let mut spectrum = vec![0.0f32; 512];
        spectrum[10] = 0.25;
        let bars = spectrum_bars(&spectrum, 44100.0, 1024, 32);
        assert_eq!(bars.len(), 32);
        assert!(bars.iter().all(|&b| (0.0..=1.0).contains(&b)));
        assert!(bars.iter().any(|&b| b > 0.5));
    }

    #[test]
    fn test_spectrum_bars_empty_input() {
        assert!(spectrum_bars(&[], 44100.0, 1024, 32).is_empty());
        assert!(spectrum_bars(&[0.1; 8], 44100.0, 16, 0).is_empty());
    }

    #[test]
    fn test_level_color_scales_band_color() {
        assert_eq!(level_color(BAND_COLORS[2], 1.0), Color::Rgb(96, 160, 255));
        assert_eq!(level_color(BAND_COLORS[2], 5.0), level_color(BAND_COLORS[2], 1.0));
        assert_eq!(level_color((100, 100, 100), -1.0), Color::Rgb(30, 30, 30));
    }

    #[test]
    fn test_band_color_follows_configured_ranges() {
        let bands = [(20.0, 250.0), (250.0, 2000.0), (2000.0, 16000.0)];
        assert_eq!(band_color(&bands, 100.0), BAND_COLORS[0]);
        assert_eq!(band_color(&bands, 250.0), BAND_COLORS[1]);
        assert_eq!(band_color(&bands, 8000.0), BAND_COLORS[2]);
        assert_eq!(band_color(&bands, 18000.0), OFF_BAND_COLOR);
    }

    #[test]
    fn test_axis_is_logarithmic() {
        assert_eq!(axis_position(20.0, 44100.0), 0.0);
        assert_eq!(axis_position(5.0, 44100.0), 0.0);
        assert!((axis_position(20_000.0, 44100.0) - 1.0).abs() < 1e-6);
        assert!((axis_position(632.46, 44100.0) - 0.5).abs() < 1e-3);
        assert!((axis_frequency(0.5, 44100.0) - 632.46).abs() < 0.5);
        // A low sample rate caps the axis at Nyquist.
        assert!((axis_frequency(1.0, 16000.0) - 8000.0).abs() < 1.0);
    }

    #[test]
    fn test_format_hz() {
        assert_eq!(format_hz(250.0), "250");
        assert_eq!(format_hz(2000.0), "2k");
    }
}
