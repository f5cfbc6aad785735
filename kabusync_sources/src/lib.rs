//! Clients for the upstream feeds the sync pipeline consumes: exchange
//! listing pages, corporate-action announcement pages and daily price bars.
//!
//! Everything here returns loosely-typed scraped records; deciding what the
//! records mean for stored data is the library crate's job.

mod actions;
mod errors;
mod html;
mod listings;
mod prices;
pub mod types;
mod user_agent;

pub use self::actions::{ActionClient, ACTION_PAGE_SIZE, DEFAULT_ACTIONS_URL};
pub use self::errors::Error;
pub use self::html::{strip_tags, table_rows};
pub use self::listings::{
    ListingClient, DEFAULT_LISTINGS_BASE_URL, DELISTED_PATH, NEW_LISTINGS_PATH,
};
pub use self::prices::{
    date_to_offset_datetime, offset_datetime_to_date, yahoo_symbol, YahooPriceClient,
};
pub use self::user_agent::get_user_agent;
