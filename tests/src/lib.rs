#[cfg(test)]
mod ui_render;
#[cfg(test)]
mod unit;
