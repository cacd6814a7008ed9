//! Built-in favor rank thresholds
//!
//! Index `n` holds the cumulative exp at which rank `n` is reached.

/// Highest rank in the built-in table
pub const MAX_RANK: u32 = 100;

/// Cumulative exp of a fully maxed student, used as the percent-of-maximum cap
pub const DEFAULT_MAX_EXP: u64 = 240_225;

pub(crate) const THRESHOLDS: [u64; MAX_RANK as usize + 1] = [
    0, 15, 30, 47, 68, 94, 127, 168, //
    218, 279, 352, 439, 541, 660, 797, 954, //
    1132, 1333, 1558, 1808, 2085, 2390, 2725, 3091, //
    3490, 3923, 4392, 4898, 5442, 6026, 6652, 7321, //
    8034, 8793, 9599, 10454, 11359, 12316, 13326, 14390, //
    15510, 16688, 17925, 19222, 20581, 22003, 23490, 25043, //
    26663, 28353, 30113, 31946, 33852, 35833, 37891, 40026, //
    42241, 44536, 46914, 49375, 51921, 54554, 57275, 60085, //
    62986, 65979, 69066, 72248, 75527, 78904, 82381, 85959, //
    89639, 93423, 97313, 101310, 105415, 109630, 113956, 118395, //
    122948, 127616, 132401, 137305, 142329, 147474, 152743, 158136, //
    163655, 169301, 175076, 180981, 187018, 193188, 199492, 205932, //
    212510, 219227, 226084, 233083, 240225,
];
