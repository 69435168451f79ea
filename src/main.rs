#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() {
    use arrow_words::app::*;
    use arrow_words::config::Config;
    use arrow_words::events::subscribe_to_room;
    use arrow_words::notifier::ChangeNotifier;
    use arrow_words::puzzle::Catalog;
    use arrow_words::{establish_pool, run_migrations};
    use axum::routing::get;
    use axum::{Extension, Router};
    use leptos::logging::log;
    use leptos::prelude::*;
    use leptos_axum::{generate_route_list, LeptosRoutes};

    let config = Config::from_env().expect("Invalid configuration.");
    let pool = establish_pool(&config.database_url).expect("Failed to create pool.");
    {
        let mut conn = pool.get().expect("Failed to get a connection.");
        let applied = run_migrations(&mut conn).expect("Failed to run migrations.");
        log!("applied {} pending migration(s)", applied);
    }
    let catalog = Catalog::builtin().expect("Failed to load the puzzle catalog.");
    log!("loaded {} puzzle(s)", catalog.puzzles().len());
    let notifier = ChangeNotifier::new();

    let conf = get_configuration(None).expect("Failed to read the Leptos configuration.");
    let addr = conf.leptos_options.site_addr;
    let leptos_options = conf.leptos_options;
    let routes = generate_route_list(App);

    let leptos_options_clone = leptos_options.clone();
    let context_pool = pool.clone();
    let context_notifier = notifier.clone();
    let app = Router::new()
        .route("/rooms/{room_id}/subscribe", get(subscribe_to_room))
        .leptos_routes_with_context(
            &leptos_options,
            routes,
            // Shared state for server functions.
            move || {
                provide_context(context_pool.clone());
                provide_context(context_notifier.clone());
                provide_context(catalog.clone());
            },
            move || shell(leptos_options_clone.clone()),
        )
        .fallback(leptos_axum::file_and_error_handler(shell))
        .layer(Extension(pool))
        .layer(Extension(notifier))
        .with_state(leptos_options.clone());

    log!("listening on http://{}", &addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind the listening address.");
    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server error.");
}

#[cfg(not(feature = "ssr"))]
pub fn main() {
    // see lib.rs for hydration function instead
}
