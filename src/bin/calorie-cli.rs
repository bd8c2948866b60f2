use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use calorie_tracker::client::CalorieClient;
use calorie_tracker::config::Config;
use calorie_tracker::context;
use calorie_tracker::errors::ServiceError;
use calorie_tracker::models::{Gender, ImageRef, MealEntry, MealSlot, Profile};
use calorie_tracker::store::{load_json, save_json, FileStore, KeyValueStore, SESSION_KEY};
use calorie_tracker::targets::{estimate_bmr, GoalInput};
use calorie_tracker::tracker::{Dashboard, MealLog};
use calorie_tracker::vision::GeminiEstimator;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "calorie-cli", version, about = "Track today's calories against your goal")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CALORIE_PASSWORD")]
        password: String,
    },
    /// Log in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CALORIE_PASSWORD")]
        password: String,
    },
    /// Forget the saved session
    Logout,
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Set the weight goal and activity level
    Goal {
        #[arg(long)]
        target_weight: String,
        #[arg(long)]
        target_days: String,
        /// Activity multiplier: 1.2, 1.375, 1.55, 1.725 or 1.9
        #[arg(long, default_value_t = 1.2)]
        activity: f64,
    },
    /// Show today's target, intake and status
    Summary,
    #[command(subcommand)]
    Meal(MealCommand),
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Fetch the profile from the server
    Show,
    /// Save the profile to the server
    Set {
        #[arg(long)]
        weight: f64,
        #[arg(long)]
        height: f64,
        #[arg(long)]
        age: u32,
        #[arg(long)]
        gender: Gender,
        /// Computed with Mifflin-St Jeor when omitted
        #[arg(long)]
        bmr: Option<f64>,
    },
}

#[derive(Subcommand)]
enum MealCommand {
    /// List today's meals
    Show,
    /// Estimate a meal's calories from a JPEG photo
    Analyze { slot: MealSlot, image: PathBuf },
    /// Enter a meal's calories by hand
    Set { slot: MealSlot, calories: u32 },
    /// Clear a meal
    Delete {
        slot: MealSlot,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct App {
    config: Config,
    store: Arc<FileStore>,
}

impl App {
    fn client(&self) -> Result<CalorieClient> {
        match load_json::<String>(self.store.as_ref(), SESSION_KEY) {
            Some(token) => CalorieClient::with_token(&self.config.api_url, token),
            None => Err(ServiceError::MissingToken.into()),
        }
    }

    fn dashboard_and_meals(&self) -> Result<(Dashboard, MealLog)> {
        let store: Arc<dyn KeyValueStore> = self.store.clone();
        let estimator = GeminiEstimator::new(
            self.config.gemini_api_key.clone(),
            &self.config.gemini_model,
            self.config.vision_timeout,
        )?;

        let (target, consumed, reader) = context::channel();
        let meals = MealLog::open(
            Local::now().date_naive(),
            store.clone(),
            Arc::new(estimator),
            consumed,
        )
        .with_timeout(self.config.vision_timeout);
        let mut dashboard = Dashboard::new(store, target, reader);
        dashboard.load_settings();
        Ok((dashboard, meals))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::from_env()?;
    let store = Arc::new(FileStore::open(&config.data_dir)?);
    let app = App { config, store };

    match cli.command {
        Command::Register {
            name,
            email,
            password,
        } => {
            let client = CalorieClient::new(&app.config.api_url);
            let user = client.register(&name, &email, &password).await?;
            println!("Registered user {}", user.user_id);
        }
        Command::Login { email, password } => {
            let client = CalorieClient::login(&app.config.api_url, &email, &password).await?;
            let token = client
                .auth
                .token()
                .await
                .context("Login returned no session token")?;
            if !save_json(app.store.as_ref(), SESSION_KEY, &token) {
                warn!("session could not be saved; you will need to log in again");
            }
            if let Some(user) = client.user() {
                println!("Logged in as {}", user.email);
            }
        }
        Command::Logout => {
            app.store.remove(SESSION_KEY)?;
            println!("Logged out");
        }
        Command::Profile(ProfileCommand::Show) => {
            let client = app.client()?;
            let (mut dashboard, _) = app.dashboard_and_meals()?;
            match client.get_profile().await? {
                Some(profile) => {
                    print_profile(&profile);
                    dashboard.set_profile(profile);
                }
                None => println!("No profile saved yet. Use `profile set` to create one."),
            }
        }
        Command::Profile(ProfileCommand::Set {
            weight,
            height,
            age,
            gender,
            bmr,
        }) => {
            let profile = Profile {
                weight,
                height,
                age,
                gender,
                bmr: bmr.unwrap_or_else(|| estimate_bmr(weight, height, age, gender)),
            };
            let client = app.client()?;
            client.save_profile(&profile).await?;
            let (mut dashboard, _) = app.dashboard_and_meals()?;
            dashboard.set_profile(profile.clone());
            print_profile(&profile);
        }
        Command::Goal {
            target_weight,
            target_days,
            activity,
        } => {
            let goal = GoalInput {
                target_weight,
                target_days,
                activity_multiplier: activity,
            }
            .to_goal();
            let (mut dashboard, _) = app.dashboard_and_meals()?;
            dashboard.set_goal(goal);
            println!(
                "Goal: {:.1} kg in {} days, {} ({})",
                goal.target_weight,
                goal.target_days,
                goal.activity.label(),
                goal.activity.multiplier()
            );
            print_summary(&dashboard);
        }
        Command::Summary => {
            let (dashboard, _meals) = app.dashboard_and_meals()?;
            print_summary(&dashboard);
        }
        Command::Meal(command) => {
            let (dashboard, meals) = app.dashboard_and_meals()?;
            match command {
                MealCommand::Show => {}
                MealCommand::Analyze { slot, image } => {
                    let jpeg = tokio::fs::read(&image)
                        .await
                        .with_context(|| format!("Failed to read {}", image.display()))?;
                    let image_ref = ImageRef(image.display().to_string());
                    match meals.analyze(slot, image_ref, &jpeg).await {
                        Ok(calories) => println!("{}: about {} kcal", slot, calories),
                        Err(e) => eprintln!("{}", e),
                    }
                }
                MealCommand::Set { slot, calories } => meals.set_calories(slot, calories).await?,
                MealCommand::Delete { slot, yes } => {
                    if !yes {
                        bail!("Deleting {} needs --yes to confirm", slot);
                    }
                    meals.delete(slot).await;
                }
            }
            for slot in MealSlot::ALL {
                print_entry(slot, &meals.entry(slot).await);
            }
            print_summary(&dashboard);
        }
    }

    Ok(())
}

fn print_profile(profile: &Profile) {
    println!(
        "Weight {:.1} kg, height {:.1} cm, age {}, {}, BMR {:.0} kcal",
        profile.weight, profile.height, profile.age, profile.gender, profile.bmr
    );
}

fn print_entry(slot: MealSlot, entry: &MealEntry) {
    let image = entry
        .image()
        .map(|i| format!(" [{}]", i))
        .unwrap_or_default();
    let state = if entry.is_analyzing() { " (analyzing)" } else { "" };
    println!("{:<10} {:>5} kcal{}{}", slot.as_str(), entry.calories(), image, state);
}

fn print_summary(dashboard: &Dashboard) {
    let summary = dashboard.summary();
    let targets = summary.targets.filter(|_| dashboard.has_profile());
    let Some(targets) = targets else {
        println!("Fill in your profile (weight, height, age, gender) to get a daily target.");
        return;
    };

    let goal = dashboard.goal();
    let direction = if targets.weight_delta > 0.0 { "Lose" } else { "Gain" };
    println!(
        "BMR {:.0} | TDEE {} | target {} kcal/day",
        summary.bmr, targets.tdee, targets.daily_calorie_target
    );
    println!(
        "{} {:.1} kg in {} days ({}{} kcal/day)",
        direction,
        targets.weight_delta.abs(),
        goal.target_days,
        if targets.daily_energy_delta > 0 { "-" } else { "+" },
        targets.daily_energy_delta.abs()
    );
    let left = if summary.remaining >= 0 { "left" } else { "over" };
    println!(
        "Eaten {} kcal, {} kcal {} - {}: {}",
        summary.consumed,
        summary.remaining.abs(),
        left,
        summary.status,
        summary.status.advice()
    );
}
