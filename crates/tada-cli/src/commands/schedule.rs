use clap::Subcommand;
use serde_json::json;
use tada_core::{IntervalSpec, Schedule, TimerMode, TimerSettings};

use super::clock_face;

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Show when a schedule will ring
    Show {
        /// Interval as MINUTESxREPEATS[:SOUND]; repeat for several, 0 repeats = forever
        #[arg(short, long = "interval", value_name = "MINxREP[:SOUND]")]
        intervals: Vec<IntervalSpec>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ScheduleAction::Show { intervals, json } => {
            let settings = TimerSettings::load();
            let schedule =
                Schedule::new(intervals)?.or_fallback(settings.target_minutes, settings.bell_sound);

            if json {
                let output = json!({
                    "mode": schedule.mode(),
                    "intervals": schedule.intervals(),
                    "targets": schedule.cumulative_targets(),
                    "finalTargetSecs": schedule.final_target_secs(),
                    "milestoneIntervalSecs": match schedule.mode() {
                        TimerMode::Unlimited => schedule.milestone_interval_secs(),
                        TimerMode::Fixed => None,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            let specs: Vec<String> = schedule.intervals().iter().map(ToString::to_string).collect();
            println!("Intervals: {}", specs.join(", "));
            match schedule.mode() {
                TimerMode::Fixed => {
                    println!("Mode: fixed");
                    for (i, target) in schedule.cumulative_targets().iter().enumerate() {
                        println!("  {:>2}. {}  {}", i + 1, clock_face(target.at_secs), target.bell_sound);
                    }
                    if let Some(total) = schedule.final_target_secs() {
                        println!("Overtime after {}", clock_face(total));
                    }
                }
                TimerMode::Unlimited => {
                    println!("Mode: unlimited");
                    if let Some(step) = schedule.milestone_interval_secs() {
                        println!(
                            "Milestone bell ({}) every {} min, no end",
                            schedule.milestone_bell(),
                            step / 60
                        );
                    }
                }
            }
        }
    }
    Ok(())
}
