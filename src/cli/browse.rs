//! Interactive terminal browser for dataset clips.
//!
//! Shows the projected 2D pose for the selected camera next to a 3D front
//! view, with keyboard navigation over splits, clips, cameras, and frames.

use std::io;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ndarray::Array2;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::symbols;
use ratatui::text::Line;
use ratatui::widgets::canvas::{Canvas, Points};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};

use crate::camera::Camera;
use crate::dataset::Aspset510;
use crate::geometry::{roi_containing_points_2d, square_containing_rectangle, to_cartesian};
use crate::mocap::Mocap;
use crate::skeleton::{skeleton_registry, JointGroup, Skeleton};

const FRAME_STEP_LARGE: usize = 25;

fn group_colour(group: JointGroup) -> Color {
    match group {
        JointGroup::Centre => Color::Magenta,
        JointGroup::Left => Color::Blue,
        JointGroup::Right => Color::Red,
    }
}

/// Browser state: the clip list plus the current selection and its loaded
/// annotation data.
struct Browser<'a> {
    aspset: &'a Aspset510,
    clips: Vec<(String, String, String)>, // (split, subject_id, clip_id)
    clip_index: usize,
    camera_index: usize,
    frame_index: usize,
    mocap: Option<Mocap>,
    camera: Option<Camera>,
    error: Option<String>,
}

impl<'a> Browser<'a> {
    fn new(aspset: &'a Aspset510) -> Result<Self> {
        let mut clips = Vec::new();
        for split in aspset.split_names() {
            for clip in aspset.split_clips(split)? {
                clips.push((
                    split.to_string(),
                    clip.subject_id().to_string(),
                    clip.clip_id().to_string(),
                ));
            }
        }
        if clips.is_empty() {
            anyhow::bail!("dataset contains no clips");
        }
        let mut browser = Self {
            aspset,
            clips,
            clip_index: 0,
            camera_index: 0,
            frame_index: 0,
            mocap: None,
            camera: None,
            error: None,
        };
        browser.load_selection();
        Ok(browser)
    }

    fn selection(&self) -> &(String, String, String) {
        &self.clips[self.clip_index]
    }

    fn camera_id(&self) -> &'static str {
        Aspset510::CAMERA_IDS[self.camera_index]
    }

    fn frame_count(&self) -> usize {
        self.mocap.as_ref().map_or(0, Mocap::frame_count)
    }

    // Loads annotations for the selected clip, keeping the browser usable
    // when files are missing.
    fn load_selection(&mut self) {
        let (_, subject_id, clip_id) = self.selection().clone();
        let clip = self.aspset.clip(&subject_id, &clip_id);
        self.error = None;
        self.mocap = match clip.load_mocap() {
            Ok(mocap) => Some(mocap),
            Err(e) => {
                self.error = Some(e.to_string());
                None
            },
        };
        self.camera = match clip.load_camera(self.camera_id()) {
            Ok(camera) => Some(camera),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e.to_string());
                }
                None
            },
        };
        self.frame_index = self.frame_index.min(self.frame_count().saturating_sub(1));
    }

    fn select_clip(&mut self, index: usize) {
        self.clip_index = index.min(self.clips.len() - 1);
        self.frame_index = 0;
        self.load_selection();
    }

    fn next_clip(&mut self) {
        self.select_clip((self.clip_index + 1) % self.clips.len());
    }

    fn previous_clip(&mut self) {
        let index = if self.clip_index == 0 {
            self.clips.len() - 1
        } else {
            self.clip_index - 1
        };
        self.select_clip(index);
    }

    // Subjects repeat across splits, so subject groups are keyed by both.
    fn group_key(&self, index: usize) -> (&str, &str) {
        let (split, subject_id, _) = &self.clips[index];
        (split.as_str(), subject_id.as_str())
    }

    fn next_subject(&mut self) {
        let len = self.clips.len();
        for offset in 1..=len {
            let index = (self.clip_index + offset) % len;
            if self.group_key(index) != self.group_key(self.clip_index) {
                self.select_clip(index);
                return;
            }
        }
    }

    fn previous_subject(&mut self) {
        let len = self.clips.len();
        let mut index = self.clip_index;
        for offset in 1..=len {
            let candidate = (self.clip_index + len - offset) % len;
            if self.group_key(candidate) != self.group_key(self.clip_index) {
                index = candidate;
                break;
            }
        }
        // Land on the first clip of that subject, not its last.
        while index > 0 && self.group_key(index - 1) == self.group_key(index) {
            index -= 1;
        }
        self.select_clip(index);
    }

    fn next_split(&mut self) {
        let len = self.clips.len();
        for offset in 1..=len {
            let index = (self.clip_index + offset) % len;
            if self.clips[index].0 != self.clips[self.clip_index].0 {
                self.select_clip(index);
                return;
            }
        }
    }

    fn cycle_camera(&mut self) {
        self.camera_index = (self.camera_index + 1) % Aspset510::CAMERA_IDS.len();
        self.load_selection();
    }

    fn step_frame(&mut self, delta: isize) {
        let count = self.frame_count();
        if count == 0 {
            return;
        }
        let index = self.frame_index as isize + delta;
        self.frame_index = index.clamp(0, count as isize - 1) as usize;
    }

    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Down | KeyCode::Char('j') => self.next_clip(),
            KeyCode::Up | KeyCode::Char('k') => self.previous_clip(),
            KeyCode::Char('J') => self.next_subject(),
            KeyCode::Char('K') => self.previous_subject(),
            KeyCode::Char('s') => self.next_split(),
            KeyCode::Right | KeyCode::Char('l') => self.step_frame(1),
            KeyCode::Left | KeyCode::Char('h') => self.step_frame(-1),
            KeyCode::PageDown => self.step_frame(FRAME_STEP_LARGE as isize),
            KeyCode::PageUp => self.step_frame(-(FRAME_STEP_LARGE as isize)),
            KeyCode::Char('c') => self.cycle_camera(),
            _ => {},
        }
        true
    }

    fn render(&self, frame: &mut Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(8),
                Constraint::Length(1),
            ])
            .split(frame.area());

        let (split, subject_id, clip_id) = self.selection();
        let header = format!(
            " {subject_id}-{clip_id} [{split}]  camera: {}  frame: {}/{}",
            self.camera_id(),
            self.frame_index + 1,
            self.frame_count().max(1),
        );
        frame.render_widget(Paragraph::new(Line::from(header)), layout[0]);

        let views = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(layout[1]);
        if let Some(error) = &self.error {
            let message = Paragraph::new(error.as_str())
                .style(Style::default().fg(Color::Red))
                .block(Block::default().borders(Borders::ALL).title("error"));
            frame.render_widget(message, layout[1]);
        } else {
            self.render_projected_view(frame, views[0]);
            self.render_front_view(frame, views[1]);
        }

        let help = " q quit  j/k clip  J/K subject  s split  h/l frame  PgUp/PgDn skip  c camera";
        frame.render_widget(
            Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
            layout[2],
        );
    }

    // Camera-projected 2D pose, framed by the square region containing it.
    fn render_projected_view(&self, frame: &mut Frame<'_>, area: Rect) {
        let Some((mocap, camera)) = self.mocap.as_ref().zip(self.camera.as_ref()) else {
            return;
        };
        let Ok(skeleton) = skeleton_registry(mocap.skeleton_name()) else {
            return;
        };
        let joints_3d = mocap
            .joint_positions()
            .index_axis(ndarray::Axis(0), self.frame_index)
            .mapv(f64::from);
        let joints_2d = to_cartesian(camera.world_to_image_space(joints_3d.view()).view(), 2);

        let (x1, y1, x2, y2) =
            square_containing_rectangle(roi_containing_points_2d(joints_2d.view(), 0.75));
        let canvas = Canvas::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("camera {}", self.camera_id())),
            )
            .marker(symbols::Marker::Braille)
            .x_bounds([x1, x2])
            // Image y grows downward; canvas y grows upward.
            .y_bounds([-y2, -y1])
            .paint(|ctx| paint_pose(ctx, &joints_2d, skeleton));
        frame.render_widget(canvas, area);
    }

    // Orthographic front view of the 3D pose (world x horizontal, y vertical).
    fn render_front_view(&self, frame: &mut Frame<'_>, area: Rect) {
        let Some(mocap) = self.mocap.as_ref() else {
            return;
        };
        let Ok(skeleton) = skeleton_registry(mocap.skeleton_name()) else {
            return;
        };
        let joints = mocap
            .joint_positions()
            .index_axis(ndarray::Axis(0), self.frame_index)
            .mapv(f64::from);
        let mut joints_xy = Array2::<f64>::zeros((joints.nrows(), 2));
        for (i, row) in joints.rows().into_iter().enumerate() {
            joints_xy[[i, 0]] = row[0];
            joints_xy[[i, 1]] = row[1];
        }
        let (x1, y1, x2, y2) =
            square_containing_rectangle(roi_containing_points_2d(joints_xy.view(), 0.75));
        let canvas = Canvas::default()
            .block(Block::default().borders(Borders::ALL).title("3d pose"))
            .marker(symbols::Marker::Braille)
            .x_bounds([x1, x2])
            .y_bounds([-y2, -y1])
            .paint(|ctx| paint_pose(ctx, &joints_xy, skeleton));
        frame.render_widget(canvas, area);
    }
}

fn paint_pose(
    ctx: &mut ratatui::widgets::canvas::Context<'_>,
    joints_2d: &Array2<f64>,
    skeleton: &Skeleton,
) {
    for joint_id in 0..skeleton.joint_count() {
        let parent_id = skeleton.parent(joint_id);
        if parent_id == joint_id {
            continue;
        }
        ctx.draw(&ratatui::widgets::canvas::Line {
            x1: joints_2d[[joint_id, 0]],
            y1: -joints_2d[[joint_id, 1]],
            x2: joints_2d[[parent_id, 0]],
            y2: -joints_2d[[parent_id, 1]],
            color: group_colour(skeleton.group(joint_id)),
        });
    }
    let points: Vec<(f64, f64)> = joints_2d
        .rows()
        .into_iter()
        .map(|row| (row[0], -row[1]))
        .collect();
    ctx.draw(&Points {
        coords: &points,
        color: Color::Gray,
    });
}

/// Run the interactive clip browser until the user quits.
pub fn run(aspset: &Aspset510) -> Result<()> {
    let mut browser = Browser::new(aspset)?;

    enable_raw_mode().context("Failed to enable raw terminal mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen)
        .context("Failed to enter alternate screen")?;
    let mut terminal =
        Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")?;

    let result = event_loop(&mut terminal, &mut browser);

    disable_raw_mode().context("Failed to disable raw terminal mode")?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to restore cursor")?;
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    browser: &mut Browser<'_>,
) -> Result<()> {
    loop {
        terminal.draw(|frame| browser.render(frame))?;
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if !browser.handle_key(key.code) {
                return Ok(());
            }
        }
    }
}
