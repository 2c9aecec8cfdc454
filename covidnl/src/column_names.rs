//! Column names shared by the exported tables and the serialized intermediate. Downstream
//! dashboards read these names directly, so changing one is a breaking change for them.

pub const CITY: &str = "city";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const DATE: &str = "date";
pub const CONFIRMED: &str = "confirmed";

pub const DEATHS: &str = "deaths";
pub const RECOVERED: &str = "recovered";
pub const DEATH_RATE: &str = "% death rate";

pub const DELTA: &str = "delta";
pub const INFLECTION: &str = "inflection";
