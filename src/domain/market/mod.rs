pub mod indicator_frame;
pub mod price_point;

pub use indicator_frame::{BollingerValue, IndicatorFrame, MacdValue};
pub use price_point::{PricePoint, PriceSeries};
