pub mod cal_address;
pub mod date_time;
pub mod duration;
pub mod geo;
pub mod recur;
pub mod text;
