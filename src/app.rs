use leptos::logging::{error, warn};
use leptos::prelude::*;
use leptos::server_fn::error::NoCustomError;
use leptos::task::spawn_local;
use leptos_meta::{provide_meta_context, MetaTags, Stylesheet, Title};
use leptos_router::{
    components::{Route, Router, Routes},
    hooks::{use_navigate, use_params_map},
    path, NavigateOptions,
};

#[cfg(feature = "hydrate")]
use crate::events::{subscribe_path, REFRESH_CELL_EVENT};
use crate::model::{RoomView, ShareLink};
use crate::puzzle::{normalize_value, ArrowWord, Description, PuzzleSummary};
use crate::sync::{CellState, GridSync};
#[cfg(feature = "ssr")]
use crate::{
    create_room_from_catalog, error::SyncError, get_room_view, notifier::ChangeNotifier,
    puzzle::Catalog, submit_cell,
};

#[cfg(feature = "ssr")]
use diesel::r2d2::{ConnectionManager, Pool};
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Coalesces bursts of refresh notifications into a single re-fetch.
#[cfg(feature = "hydrate")]
const REFRESH_DEBOUNCE_MS: u32 = 50;

pub fn room_path(room_id: &str) -> String {
    format!("/rooms/{}", room_id)
}

/// HTTP status reported for a failed request.
#[cfg(feature = "ssr")]
fn error_status(e: &SyncError) -> axum::http::StatusCode {
    use axum::http::StatusCode;

    if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

// Turns a domain error into a server function error, setting the HTTP status to match.
#[cfg(feature = "ssr")]
fn reject(e: SyncError) -> ServerFnError<NoCustomError> {
    use leptos_axum::ResponseOptions;

    let status = error_status(&e);
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    if let Some(resp) = use_context::<ResponseOptions>() {
        resp.set_status(status);
    }
    ServerFnError::ServerError(e.to_string())
}

/// Runs blocking database work on a pooled connection.
#[cfg(feature = "ssr")]
async fn with_connection<T, F>(f: F) -> Result<T, ServerFnError<NoCustomError>>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, SyncError> + Send + 'static,
{
    let pool: DbPool = expect_context();
    let result = tokio::task::spawn_blocking(move || -> Result<T, SyncError> {
        let mut conn = pool.get()?;
        f(&mut *conn)
    })
    .await
    .map_err(|e| ServerFnError::<NoCustomError>::ServerError(e.to_string()))?;
    result.map_err(reject)
}

#[server(ListPuzzles)]
pub async fn list_puzzles() -> Result<Vec<PuzzleSummary>, ServerFnError<NoCustomError>> {
    let catalog: Catalog = expect_context();
    Ok(catalog.summaries())
}

#[server(GetPuzzle)]
pub async fn get_puzzle(puzzle_id: String) -> Result<ArrowWord, ServerFnError<NoCustomError>> {
    let catalog: Catalog = expect_context();
    catalog.resolve(&puzzle_id).cloned().map_err(reject)
}

/// Creates a room for a catalog puzzle and returns the new room's id.
#[server(CreateRoom)]
pub async fn create_room_handler(puzzle_id: String) -> Result<String, ServerFnError<NoCustomError>> {
    use leptos::logging::log;

    let catalog: Catalog = expect_context();
    let room =
        with_connection(move |conn| create_room_from_catalog(conn, &catalog, &puzzle_id)).await?;
    log!("Created room {}", room.id);
    Ok(room.id)
}

#[server(GetRoom)]
pub async fn get_room_handler(room_id: String) -> Result<RoomView, ServerFnError<NoCustomError>> {
    with_connection(move |conn| get_room_view(conn, &room_id)).await
}

/// Stores one letter (or clears it) and notifies the room's listeners. Returns the cell id.
#[server(WriteCell)]
pub async fn write_cell(
    room_id: String,
    row: i32,
    col: i32,
    value: String,
) -> Result<String, ServerFnError<NoCustomError>> {
    let notifier: ChangeNotifier = expect_context();
    let change =
        with_connection(move |conn| submit_cell(conn, &notifier, &room_id, row, col, &value))
            .await?;
    Ok(change.cell_id)
}

/// Absolute link to a room, as seen by the requesting browser, with a QR code for it.
#[server(GetShareLink)]
pub async fn get_share_link(room_id: String) -> Result<ShareLink, ServerFnError<NoCustomError>> {
    use axum::http::HeaderMap;
    use leptos_axum::extract;
    use qrcode::{render::svg, QrCode};

    let headers: HeaderMap = extract()
        .await
        .map_err(|e| ServerFnError::<NoCustomError>::ServerError(e.to_string()))?;
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost:3000");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let url = format!("{}://{}{}", scheme, host, room_path(&room_id));

    let code = QrCode::new(url.as_bytes())
        .map_err(|e| ServerFnError::<NoCustomError>::ServerError(e.to_string()))?;
    let qr_svg = code
        .render::<svg::Color>()
        .min_dimensions(160, 160)
        .build();
    Ok(ShareLink { url, qr_svg })
}

pub fn shell(options: LeptosOptions) -> impl IntoView {
    view! {
        <!DOCTYPE html>
        <html lang="fr">
            <head>
                <meta charset="utf-8" />
                <meta name="viewport" content="width=device-width, initial-scale=1" />
                <AutoReload options=options.clone() />
                <HydrationScripts options />
                <MetaTags />
            </head>
            <body>
                <App />
            </body>
        </html>
    }
}

#[component]
pub fn App() -> impl IntoView {
    provide_meta_context();

    view! {
        <Stylesheet id="leptos" href="/pkg/arrow-words.css" />
        <Title text="Mots fléchés multijoueurs" />

        <Router>
            <main>
                <Routes fallback=|| "Page introuvable.".into_view()>
                    <Route path=path!("/") view=Home />
                    <Route path=path!("/puzzles/:puzzle_id") view=PuzzlePage />
                    <Route path=path!("/rooms/:room_id") view=RoomPage />
                </Routes>
            </main>
        </Router>
    }
}

#[component]
fn Home() -> impl IntoView {
    let puzzles = Resource::new(|| (), |_| list_puzzles());

    view! {
        <div class="page">
            <h1>"Mots fléchés multijoueurs"</h1>
            <p>
                "Choisissez une grille, créez une salle, puis partagez son lien pour la remplir à plusieurs."
            </p>
            <Suspense fallback=|| {
                view! { "Chargement..." }
            }>
                {move || {
                    puzzles
                        .with(|res| match res {
                            // The newest puzzle is shown until another one is picked.
                            Some(Ok(puzzles)) => {
                                match puzzles.first() {
                                    Some(newest) => {
                                        let id = newest.id.to_string();
                                        view! {
                                            <PuzzlePreview puzzle_id=Signal::derive(move || id.clone()) />
                                        }
                                            .into_any()
                                    }
                                    None => view! { <p>"Aucune grille disponible."</p> }.into_any(),
                                }
                            }
                            Some(Err(e)) => {
                                view! { <p class="error">{e.to_string()}</p> }.into_any()
                            }
                            None => view! {}.into_any(),
                        })
                }}
            </Suspense>
        </div>
    }
}

/// Drop-down of the catalog. Picking a puzzle opens its preview page.
#[component]
fn PuzzlePicker(#[prop(into)] selected: Signal<Option<u32>>) -> impl IntoView {
    let puzzles = Resource::new(|| (), |_| list_puzzles());
    let navigate = use_navigate();

    let on_change = move |ev| {
        let id = event_target_value(&ev);
        if !id.is_empty() {
            navigate(&format!("/puzzles/{}", id), NavigateOptions::default());
        }
    };

    view! {
        <label>
            "Grille de mots fléchés "
            <select on:change=on_change>
                <option value="">"Sélectionner la grille à résoudre"</option>
                <Suspense fallback=|| {
                    view! { "Chargement..." }
                }>
                    {move || {
                        puzzles
                            .with(|res| match res {
                                Some(Ok(puzzles)) => {
                                    puzzles
                                        .iter()
                                        .map(|puzzle| {
                                            let id = puzzle.id;
                                            view! {
                                                <option
                                                    value=id.to_string()
                                                    selected=move || selected.get() == Some(id)
                                                >
                                                    {puzzle.info.clone()}
                                                </option>
                                            }
                                        })
                                        .collect_view()
                                        .into_any()
                                }
                                Some(Err(e)) => {
                                    view! { <option disabled=true>{e.to_string()}</option> }
                                        .into_any()
                                }
                                None => view! {}.into_any(),
                            })
                    }}
                </Suspense>
            </select>
        </label>
    }
}

#[component]
fn PuzzlePage() -> impl IntoView {
    let params = use_params_map();
    let puzzle_id = Signal::derive(move || params.read().get("puzzle_id").unwrap_or_default());

    view! {
        <div class="page">
            <PuzzlePreview puzzle_id />
        </div>
    }
}

/// Preview of one puzzle with the button creating a room for it.
#[component]
fn PuzzlePreview(#[prop(into)] puzzle_id: Signal<String>) -> impl IntoView {
    let puzzle = Resource::new(move || puzzle_id.get(), get_puzzle);
    let creating = RwSignal::new(false);
    let error = RwSignal::new(String::new());
    let navigate = use_navigate();

    let create = move |_| {
        let id = puzzle_id.get_untracked();
        let navigate = navigate.clone();
        creating.set(true);
        spawn_local(async move {
            match create_room_handler(id).await {
                Ok(room_id) => {
                    error.set(String::new());
                    navigate(&room_path(&room_id), NavigateOptions::default());
                }
                Err(e) => {
                    creating.set(false);
                    error.set(e.to_string());
                }
            }
        });
    };

    view! {
        <PuzzlePicker selected=Signal::derive(move || puzzle_id.get().parse::<u32>().ok()) />
        <Suspense fallback=|| {
            view! { "Chargement..." }
        }>
            {move || {
                puzzle
                    .with(|res| match res {
                        Some(Ok(puzzle)) => {
                            view! {
                                <h1>{puzzle.info.clone()}</h1>
                                <PuzzleGrid description=puzzle.description.clone() />
                            }
                                .into_any()
                        }
                        Some(Err(_)) => view! { <p>"Grille introuvable."</p> }.into_any(),
                        None => view! {}.into_any(),
                    })
            }}
        </Suspense>
        <button on:click=create disabled=move || creating.get()>
            "Créer une salle"
        </button>
        {move || (!error.get().is_empty()).then(|| view! { <p class="error">{error.get()}</p> })}
    }
}

/// Read-only rendering of a grid.
#[component]
fn PuzzleGrid(description: Description) -> impl IntoView {
    let rows = (0..description.rows)
        .map(|row| {
            let cells = (0..description.cols)
                .map(|col| field_view(&description, row, col, None))
                .collect_view();
            view! { <div class="row">{cells}</div> }
        })
        .collect_view();
    view! { <div class="grid">{rows}</div> }
}

// One square of the grid: a question with its arrow, or a letter cell with its optional prize
// index and input.
fn field_view(description: &Description, row: i32, col: i32, input: Option<AnyView>) -> AnyView {
    if let Some(question) = description.question_at(row, col) {
        let class = format!("cell question {}", question.arrow_type.css_class());
        return view! {
            <div class=class>
                <span>{question.display_text()}</span>
            </div>
        }
        .into_any();
    }

    let prize_index = description.prize_index(row, col);
    let class = if prize_index.is_some() {
        "cell prize"
    } else {
        "cell"
    };
    view! {
        <div class=class>
            {prize_index.map(|index| view! { <p class="field-index">{index}</p> })}
            {input}
        </div>
    }
    .into_any()
}

/// The shared room: a live grid every visitor can type into.
#[component]
fn RoomPage() -> impl IntoView {
    let params = use_params_map();
    let room_id = Memo::new(move |_| params.read().get("room_id").unwrap_or_default());
    let room = Resource::new(move || room_id.get(), get_room_handler);
    let share = Resource::new(move || room_id.get(), get_share_link);
    let grid = RwSignal::new(GridSync::new());

    // The puzzle never changes, so the grid is built once per room and survives re-fetches.
    let puzzle = Memo::new(move |_| {
        room.with(|res| {
            res.as_ref()
                .and_then(|view| view.as_ref().ok())
                .map(|view| view.puzzle.clone())
        })
    });

    // Every fetched snapshot is merged into what is displayed.
    Effect::new(move || {
        room.with(|res| {
            if let Some(Ok(view)) = res {
                grid.maybe_update(|grid| grid.reconcile(&view.cells));
            }
        });
    });

    #[cfg(feature = "hydrate")]
    {
        let listener = StoredValue::new_local(None::<RefreshListener>);
        Effect::new(move || {
            let id = room_id.get();
            let scheduled = std::rc::Rc::new(std::cell::Cell::new(false));
            let opened = RefreshListener::open(&id, move || {
                if scheduled.replace(true) {
                    return;
                }
                let scheduled = scheduled.clone();
                spawn_local(async move {
                    gloo_timers::future::TimeoutFuture::new(REFRESH_DEBOUNCE_MS).await;
                    scheduled.set(false);
                    room.refetch();
                });
            });
            match opened {
                Ok(next) => listener.update_value(|current| {
                    if let Some(previous) = current.replace(next) {
                        previous.close();
                    }
                }),
                Err(e) => error!("Could not open the event stream of room {}: {:?}", id, e),
            }
        });
        on_cleanup(move || {
            listener.try_update_value(|current| {
                if let Some(current) = current.take() {
                    current.close();
                }
            });
        });
    }

    view! {
        <div class="page room">
            // Refreshes re-fetch the room; keep the grid on screen while they load.
            <Transition fallback=|| {
                view! { "Chargement de la grille..." }
            }>
                {move || {
                    room.with(|res| match res {
                        Some(Err(e)) => Some(view! { <p class="error">{e.to_string()}</p> }),
                        _ => None,
                    })
                }}
                {move || {
                    puzzle
                        .get()
                        .map(|puzzle| {
                            let info = puzzle.info.clone();
                            view! {
                                <h1>{info}</h1>
                                <RoomGrid
                                    room_id=room_id.get_untracked()
                                    description=puzzle.description
                                    grid=grid
                                />
                            }
                        })
                }}
            </Transition>
            <Suspense>
                {move || {
                    share
                        .with(|res| match res {
                            Some(Ok(link)) => {
                                view! {
                                    <div class="share">
                                        <p>
                                            "Invitez vos ami·e·s : "
                                            <a href=link.url.clone()>{link.url.clone()}</a>
                                        </p>
                                        <div class="qr" inner_html=link.qr_svg.clone()></div>
                                    </div>
                                }
                                    .into_any()
                            }
                            _ => view! {}.into_any(),
                        })
                }}
            </Suspense>
        </div>
    }
}

#[component]
fn RoomGrid(room_id: String, description: Description, grid: RwSignal<GridSync>) -> impl IntoView {
    let rows = (0..description.rows)
        .map(|row| {
            let cells = (0..description.cols)
                .map(|col| {
                    let input = description
                        .is_letter_cell(row, col)
                        .then(|| letter_input(room_id.clone(), row, col, grid));
                    field_view(&description, row, col, input)
                })
                .collect_view();
            view! { <div class="row">{cells}</div> }
        })
        .collect_view();
    view! { <div class="grid">{rows}</div> }
}

// Input of one letter cell. Edits show up at once and are sent in the background; a rejected
// write puts the cell back to what the server last confirmed.
fn letter_input(room_id: String, row: i32, col: i32, grid: RwSignal<GridSync>) -> AnyView {
    let on_input = move |ev| {
        let value = match normalize_value(&event_target_value(&ev)) {
            Ok(value) => value,
            Err(_) => {
                // Not a letter: notify so the input shows the current value again.
                grid.update(|_| ());
                return;
            }
        };
        let Some(edit) = grid.try_update(|grid| grid.local_edit(row, col, &value)) else {
            return;
        };
        let room_id = room_id.clone();
        spawn_local(async move {
            match write_cell(room_id, edit.row, edit.col, edit.value.clone()).await {
                Ok(_) => grid.update(|grid| grid.confirm(&edit)),
                Err(e) => {
                    warn!("Could not save cell ({}, {}): {}", edit.row, edit.col, e);
                    grid.update(|grid| grid.fail(&edit, e.to_string()));
                }
            }
        });
    };

    let class = move || match grid.with(|grid| grid.state(row, col)) {
        CellState::Pending { .. } => "letter pending",
        CellState::Failed { .. } => "letter failed",
        CellState::Idle | CellState::Confirmed => "letter",
    };
    let title = move || match grid.with(|grid| grid.state(row, col)) {
        CellState::Failed { error } => error,
        _ => String::new(),
    };

    view! {
        <input
            type="text"
            maxlength="1"
            autocomplete="off"
            class=class
            title=title
            prop:value=move || grid.with(|grid| grid.display(row, col))
            on:input=on_input
        />
    }
    .into_any()
}

/// Browser side of a room's event stream.
#[cfg(feature = "hydrate")]
struct RefreshListener {
    source: web_sys::EventSource,
    _callback: wasm_bindgen::closure::Closure<dyn Fn(web_sys::Event)>,
}

#[cfg(feature = "hydrate")]
impl RefreshListener {
    fn open(room_id: &str, on_refresh: impl Fn() + 'static) -> Result<Self, wasm_bindgen::JsValue> {
        use wasm_bindgen::closure::Closure;
        use wasm_bindgen::JsCast;

        let source = web_sys::EventSource::new(&subscribe_path(room_id))?;
        let callback = Closure::<dyn Fn(web_sys::Event)>::new(move |_: web_sys::Event| on_refresh());
        source.add_event_listener_with_callback(
            REFRESH_CELL_EVENT,
            callback.as_ref().unchecked_ref(),
        )?;
        // Refreshes sent while the connection was down are lost: catch up on every (re)open.
        source.add_event_listener_with_callback("open", callback.as_ref().unchecked_ref())?;
        Ok(RefreshListener {
            source,
            _callback: callback,
        })
    }

    fn close(&self) {
        self.source.close();
    }
}
