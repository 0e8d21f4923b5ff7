mod app;
mod preview;
mod settings;

use app::App;

fn main() -> iced::Result {
    env_logger::init();

    iced::application(App::new, App::update, App::view)
        .title("Face Detection")
        .subscription(App::subscription)
        .window(iced::window::Settings {
            size: iced::Size::new(480.0, 320.0),
            exit_on_close_request: false,
            ..Default::default()
        })
        .run()
}
