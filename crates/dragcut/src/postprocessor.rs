use crate::config::{OutputOptions, Positioning, ToolProfile};
use crate::types::{ArcDirection, CompiledProgram, GCode, Move, MoveKind, ToolState, ToolTransition};

/// Fixed-point formatting on an integer grid, so equal inputs always print
/// the same digits and zero never prints as `-0`.
#[derive(Debug, Clone, Copy)]
pub struct NumberFormat {
    precision: u32,
    scale: f64,
}

impl NumberFormat {
    pub fn new(precision: u32) -> Self {
        Self {
            precision,
            scale: 10f64.powi(precision as i32),
        }
    }

    /// Value in grid units.
    pub fn units(&self, value: f64) -> i64 {
        (value * self.scale).round() as i64
    }

    pub fn format_units(&self, units: i64) -> String {
        let sign = if units < 0 { "-" } else { "" };
        let magnitude = units.unsigned_abs();
        if self.precision == 0 {
            return format!("{sign}{magnitude}");
        }
        let divisor = 10u64.pow(self.precision);
        format!(
            "{sign}{}.{:0width$}",
            magnitude / divisor,
            magnitude % divisor,
            width = self.precision as usize
        )
    }

    pub fn format(&self, value: f64) -> String {
        self.format_units(self.units(value))
    }
}

/// Feed rates print without decimals when they are whole numbers.
fn format_feed(feed: f64, numbers: &NumberFormat) -> String {
    if feed.fract() == 0.0 && feed.abs() < 1e12 {
        format!("{}", feed as i64)
    } else {
        numbers.format(feed)
    }
}

struct Emitter<'a> {
    tool: &'a ToolProfile,
    output: &'a OutputOptions,
    numbers: NumberFormat,
    lines: Vec<String>,
    /// Last emitted XY position in grid units.
    position: (i64, i64),
    z: f64,
    feed: Option<f64>,
}

impl<'a> Emitter<'a> {
    fn relative(&self) -> bool {
        self.output.positioning == Positioning::Relative
    }

    /// `X.. Y..` words for a target, as deltas in relative mode.
    fn xy_words(&mut self, target: kurbo::Point) -> String {
        let units = (self.numbers.units(target.x), self.numbers.units(target.y));
        let (x, y) = if self.relative() {
            (units.0 - self.position.0, units.1 - self.position.1)
        } else {
            units
        };
        self.position = units;
        format!(
            "X{} Y{}",
            self.numbers.format_units(x),
            self.numbers.format_units(y)
        )
    }

    fn feed_word(&mut self, feed: f64) -> String {
        if self.feed == Some(feed) {
            return String::new();
        }
        self.feed = Some(feed);
        format!(" F{}", format_feed(feed, &self.numbers))
    }

    fn emit_move(&mut self, mv: &Move) {
        match mv.kind {
            MoveKind::Linear if !mv.tool_down => {
                let words = self.xy_words(mv.end);
                self.lines.push(format!("G0 {words}"));
            }
            MoveKind::Linear => {
                let words = self.xy_words(mv.end);
                let feed = self.feed_word(mv.feed_rate);
                self.lines.push(format!("G1 {words}{feed}"));
            }
            MoveKind::Arc {
                center_offset,
                direction,
            } => {
                let code = match direction {
                    ArcDirection::Clockwise => "G2",
                    ArcDirection::CounterClockwise => "G3",
                };
                let words = self.xy_words(mv.end);
                let i = self.numbers.format(center_offset.x);
                let j = self.numbers.format(center_offset.y);
                let feed = self.feed_word(mv.feed_rate);
                self.lines.push(format!("{code} {words} I{i} J{j}{feed}"));
            }
            MoveKind::ToolChange(transition) => self.emit_tool_change(mv, transition),
        }
    }

    fn emit_tool_change(&mut self, mv: &Move, transition: ToolTransition) {
        let commands = &self.tool.commands;
        let (template, target_z) = match (mv.tool_state, transition) {
            (ToolState::Cut, ToolTransition::Down { pass }) => {
                (&commands.cut_down, self.tool.pass_depth(pass))
            }
            (ToolState::Cut, ToolTransition::Up) => (&commands.cut_up, self.tool.up_z),
            (ToolState::Draw, ToolTransition::Down { .. }) => (&commands.draw_down, self.tool.draw_z),
            (ToolState::Draw, ToolTransition::Up) => (&commands.draw_up, self.tool.up_z),
            (ToolState::Laser { .. }, ToolTransition::Down { .. }) => (&commands.laser_on, self.z),
            (ToolState::Laser { .. }, ToolTransition::Up) => (&commands.laser_off, self.z),
        };
        let template = template.clone();
        let power = match mv.tool_state {
            ToolState::Laser { power } => {
                (power.clamp(0.0, 1.0) * self.tool.laser_power_scale).round() as i64
            }
            _ => 0,
        };

        let z = if self.relative() {
            self.numbers.units(target_z) - self.numbers.units(self.z)
        } else {
            self.numbers.units(target_z)
        };
        if template.contains("{z}") {
            self.z = target_z;
        }
        let feed = format_feed(mv.feed_rate, &self.numbers);
        if template.contains("{feed}") {
            self.feed = Some(mv.feed_rate);
        }
        let line = template
            .replace("{z}", &self.numbers.format_units(z))
            .replace("{feed}", &feed)
            .replace("{power}", &power.to_string());
        self.lines.extend(line.lines().map(str::to_string));
    }
}

/// Render a compiled program as G-code.
///
/// The header declares millimetres and the positioning mode once; the mode
/// never changes afterwards. In relative mode the program assumes it starts
/// at the machine start position with the tool raised.
pub fn post_process(program: &CompiledProgram, tool: &ToolProfile, output: &OutputOptions) -> GCode {
    let numbers = NumberFormat::new(output.decimal_precision);
    let summary = &program.summary;
    let start = program
        .moves
        .first()
        .map(|m| (numbers.units(m.start.x), numbers.units(m.start.y)))
        .unwrap_or((0, 0));

    let mut emitter = Emitter {
        tool,
        output,
        numbers,
        lines: Vec::new(),
        position: start,
        z: tool.up_z,
        feed: None,
    };

    // Header
    emitter.lines.push("; dragcut motion program".to_string());
    emitter.lines.push(format!(
        "; paths: {}, cut: {} mm, travel: {} mm",
        summary.path_count,
        numbers.format(summary.cut_length),
        numbers.format(summary.travel_length)
    ));
    emitter.lines.push("G21".to_string()); // Millimeters
    emitter.lines.push(match output.positioning {
        Positioning::Absolute => "G90".to_string(),
        Positioning::Relative => "G91".to_string(),
    });
    if output.set_origin {
        emitter.lines.push("G92 X0 Y0".to_string());
    }
    emitter.lines.extend(output.header_lines.iter().cloned());
    if output.positioning == Positioning::Absolute {
        emitter
            .lines
            .push(format!("G0 Z{}", numbers.format(tool.up_z))); // Safe height
    }

    for mv in &program.moves {
        emitter.emit_move(mv);
    }

    emitter.lines.extend(output.footer_lines.iter().cloned());
    GCode {
        lines: emitter.lines,
    }
}
