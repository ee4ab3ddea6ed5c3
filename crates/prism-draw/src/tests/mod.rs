mod draws;
mod util;
