mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_cart_add, cmd_cart_remove, cmd_cart_show, cmd_ingredient_add, cmd_ingredient_import,
    cmd_ingredient_search, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_import,
    cmd_recipe_list, cmd_recipe_set, cmd_recipe_show, cmd_shopping_list,
};
use crate::config::Config;
use crate::server::{DEFAULT_SEARCH_LIMIT, ServerOptions};
use pantry_core::export::ExportFormat;
use pantry_core::service::PantryService;

#[derive(Parser)]
#[command(
    name = "pantry",
    version,
    about = "Recipes, shopping carts and consolidated shopping lists"
)]
struct Cli {
    /// Path to the database file (default: pantry.db in the data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Emit logs as JSON lines (filter with RUST_LOG)
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search and manage the ingredient catalog
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage recipes and their ingredient lists
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage a user's shopping cart
    Cart {
        #[command(subcommand)]
        command: CartCommands,
    },
    /// Build the consolidated shopping list for a user's cart
    ShoppingList {
        /// User id
        #[arg(short, long)]
        user: i64,
        /// Output format: txt, csv, json
        #[arg(short, long, default_value = "txt")]
        format: ExportFormat,
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Show as a table instead of the export body
        #[arg(long, conflicts_with = "output")]
        table: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
        /// Upper bound for the `limit` parameter of ingredient search
        #[arg(long, default_value = "100")]
        search_limit_max: usize,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Find ingredients whose name starts with a prefix (case-insensitive)
    Search {
        /// Name prefix
        prefix: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient to the catalog
    Add {
        /// Ingredient name
        name: String,
        /// Measurement unit (e.g. g, ml, pcs)
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import ingredients from a CSV or JSON file
    Import {
        /// Path to a .csv (name,measurement_unit) or .json file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new, empty recipe
    Create {
        /// Recipe name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a recipe's ingredient list
    Set {
        /// Recipe ID
        id: i64,
        /// Ingredients as name:unit:amount (e.g. "Tomato:g:200")
        #[arg(required = true)]
        ingredients: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: PathBuf,
        /// Recipe name override (defaults to metadata title or filename)
        #[arg(long)]
        name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe and its ingredients
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe (also removes it from every cart)
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CartCommands {
    /// Put a recipe into the cart
    Add {
        /// Recipe ID
        recipe_id: i64,
        /// User id
        #[arg(short, long)]
        user: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Take a recipe out of the cart
    Remove {
        /// Recipe ID
        recipe_id: i64,
        /// User id
        #[arg(short, long)]
        user: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the recipes in the cart
    Show {
        /// User id
        #[arg(short, long)]
        user: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to initialise logging: {e}");
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db.as_deref())?;
    let service = PantryService::open(&config.db_path)?;

    match cli.command {
        Commands::Ingredient { command } => match command {
            IngredientCommands::Search {
                prefix,
                limit,
                json,
            } => cmd_ingredient_search(&service, &prefix, limit, json),
            IngredientCommands::Add { name, unit, json } => {
                cmd_ingredient_add(&service, &name, &unit, json)
            }
            IngredientCommands::Import { file, json } => {
                cmd_ingredient_import(&service, &file, json)
            }
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create { name, json } => cmd_recipe_create(&service, &name, json),
            RecipeCommands::Set {
                id,
                ingredients,
                json,
            } => cmd_recipe_set(&service, id, &ingredients, json),
            RecipeCommands::Import { file, name, json } => {
                cmd_recipe_import(&service, &file, name, json)
            }
            RecipeCommands::Show { id, json } => cmd_recipe_show(&service, id, json),
            RecipeCommands::List { json } => cmd_recipe_list(&service, json),
            RecipeCommands::Delete { id, json } => cmd_recipe_delete(&service, id, json),
        },
        Commands::Cart { command } => match command {
            CartCommands::Add {
                recipe_id,
                user,
                json,
            } => cmd_cart_add(&service, user, recipe_id, json),
            CartCommands::Remove {
                recipe_id,
                user,
                json,
            } => cmd_cart_remove(&service, user, recipe_id, json),
            CartCommands::Show { user, json } => cmd_cart_show(&service, user, json),
        },
        Commands::ShoppingList {
            user,
            format,
            output,
            table,
        } => cmd_shopping_list(&service, user, format, output.as_deref(), table),
        Commands::Serve {
            port,
            bind,
            no_auth,
            search_limit_max,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?)
            };
            let options = ServerOptions {
                port,
                bind,
                api_key,
                search_limit_max,
            };
            server::start_server(service, options).await
        }
    }
}
