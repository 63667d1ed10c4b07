mod app;
mod camera;
mod input;
mod level;
mod player;
mod renderer;
mod settings;

fn main() {
    app::run();
}
