pub mod claude;
pub mod error;
pub mod openrouter;
pub mod traits;
pub mod util;

pub use claude::Claude;
pub use error::AiError;
pub use openrouter::OpenRouter;
pub use traits::ChatModel;
pub use util::{strip_code_blocks, truncate_to_char_boundary};
