use clap::Parser;

/// Program name used as `argv[0]` when arguments come from the page URL
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
const PROGRAM_NAME: &str = "visit-atlas";

/// Parses from the command line arguments on native and from GET parameters on web.
///
/// On web, `?clicountries=world.geojson&cliignore-persisted` becomes
/// `--countries world.geojson --ignore-persisted`.
pub fn parse_args<T: Parser>() -> Result<T, clap::Error> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        T::try_parse()
    }
    #[cfg(target_arch = "wasm32")]
    {
        let location_string = web_sys::window()
            .and_then(|w| w.location().href().ok())
            .unwrap_or_default();
        T::try_parse_from(query_to_args(&location_string))
    }
}

/// Read a `LOG_LEVEL`-style `env`-prefixed GET parameter
#[cfg(target_arch = "wasm32")]
pub fn get_env(key: &str) -> Option<String> {
    let location_string = web_sys::window().and_then(|w| w.location().href().ok())?;
    query_pairs(&location_string)
        .find_map(|(k, v)| (k.strip_prefix("env")? == key).then(|| v.to_string()))
}

/// Split the query string of `url` into `(key, value)` pairs; flags get an empty value
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn query_pairs(url: &str) -> impl Iterator<Item = (&str, &str)> {
    let query = url
        .split_once('?')
        .map(|(_, q)| q.split('#').next().unwrap_or(q))
        .unwrap_or("");
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
}

/// Turn `cli`-prefixed GET parameters into command line arguments
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn query_to_args(url: &str) -> Vec<String> {
    let mut args = vec![PROGRAM_NAME.to_string()];

    for (key, value) in query_pairs(url) {
        let Some(arg_key) = key.strip_prefix("cli") else {
            continue;
        };
        if !arg_key.is_empty() {
            args.push(format!("--{arg_key}"));
        }
        if !value.is_empty() {
            args.push(value.to_string());
        }
    }
    args
}
