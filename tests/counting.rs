// 该文件是 Jishu （计数） 项目的一部分。
// tests/counting.rs - 计数任务集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  cell::{Cell, RefCell},
  collections::VecDeque,
  convert::Infallible,
};

use image::{Rgb, RgbImage};
use jishu::{
  frame::Frame,
  geometry::{Point, Region},
  input::{InteractiveCapture, Preview},
  model::{DetectResult, Detection, Detector},
  output::{AnnotatedFrame, Draw, Geometry, Render},
  task::{CaptureCountTask, CountTask, Task},
};

struct MockDetector {
  results: Vec<DetectResult>,
  calls: Cell<usize>,
  confidence: Cell<f32>,
  seen_pixel: Cell<Option<u8>>,
}

impl MockDetector {
  fn new(results: Vec<DetectResult>) -> Self {
    Self {
      results,
      calls: Cell::new(0),
      confidence: Cell::new(f32::NAN),
      seen_pixel: Cell::new(None),
    }
  }
}

impl Detector for MockDetector {
  type Error = Infallible;

  fn detect(&self, frame: &Frame, confidence: f32) -> Result<Vec<DetectResult>, Self::Error> {
    self.calls.set(self.calls.get() + 1);
    self.confidence.set(confidence);
    self.seen_pixel.set(Some(frame.image().get_pixel(0, 0)[0]));
    Ok(self.results.clone())
  }
}

#[derive(Default)]
struct RecordingOutput {
  counts: RefCell<Vec<usize>>,
}

impl Render for RecordingOutput {
  type Error = Infallible;

  fn render_result(&self, annotated: &AnnotatedFrame) -> Result<(), Self::Error> {
    self.counts.borrow_mut().push(annotated.count());
    Ok(())
  }
}

struct ScriptedPreview {
  keys: VecDeque<Option<i32>>,
}

impl Preview for ScriptedPreview {
  type Error = Infallible;

  fn show(&mut self, _frame: &Frame) -> Result<(), Self::Error> {
    Ok(())
  }

  fn poll_key(&mut self) -> Result<Option<i32>, Self::Error> {
    Ok(self.keys.pop_front().flatten())
  }
}

fn square(x: f32, y: f32) -> Detection {
  Detection {
    region: Region::Rotated([
      Point::new(x, y),
      Point::new(x + 10.0, y),
      Point::new(x + 10.0, y + 10.0),
      Point::new(x, y + 10.0),
    ]),
    score: 0.9,
    class_id: 0,
  }
}

fn frame(tag: u8) -> Frame {
  Frame::from(RgbImage::from_pixel(64, 64, Rgb([tag, 0, 0])))
}

fn camera(n: u8) -> impl Iterator<Item = Result<Frame, std::io::Error>> {
  (0..n).map(|i| Ok(frame(i)))
}

#[test]
fn zero_detections_count_zero() {
  let model = MockDetector::new(vec![DetectResult::empty()]);
  let output = RecordingOutput::default();

  let report = CountTask::default()
    .run_task(std::iter::once(frame(0)), &model, &output)
    .unwrap();

  assert_eq!(report.total(), 0);
  assert_eq!(report.total_line(), "TOTAL OBJECTS: 0");
  assert_eq!(*output.counts.borrow(), vec![0]);
}

#[test]
fn count_matches_outlines_and_sequence() {
  let model = MockDetector::new(vec![
    DetectResult::new(vec![square(40.0, 40.0), square(0.0, 0.0)]),
    DetectResult::empty(),
    DetectResult::new(vec![square(20.0, 0.0), square(0.0, 20.0)]),
  ]);
  let output = RecordingOutput::default();

  let report = CountTask::default()
    .with_confidence(0.4)
    .run_task(std::iter::once(frame(0)), &model, &output)
    .unwrap();

  assert_eq!(model.confidence.get(), 0.4);
  assert_eq!(report.total(), 4);
  assert_eq!(report.annotated.outlines(), 4);
  let indices: Vec<usize> = report.annotated.labels.iter().map(|l| l.index).collect();
  assert_eq!(indices, vec![1, 2, 3, 4]);
  assert_eq!(report.annotated.labels[0].anchor, (45, 45));
  assert_eq!(report.total_line(), "TOTAL OBJECTS: 4");
}

#[test]
fn default_confidence_is_quarter() {
  let model = MockDetector::new(vec![]);
  CountTask::default()
    .run_task(std::iter::once(frame(0)), &model, RecordingOutput::default())
    .unwrap();
  assert_eq!(model.confidence.get(), 0.25);
}

#[test]
fn missing_frame_is_an_error() {
  let model = MockDetector::new(vec![]);
  let result = CountTask::default().run_task(std::iter::empty::<Frame>(), &model, RecordingOutput::default());
  assert!(result.is_err());
  assert_eq!(model.calls.get(), 0);
}

#[test]
fn aligned_geometry_uses_offset_anchor() {
  let model = MockDetector::new(vec![DetectResult::new(vec![square(20.0, 30.0)])]);
  let report = CountTask::new(Draw::new(Geometry::Aligned))
    .run_task(std::iter::once(frame(0)), &model, RecordingOutput::default())
    .unwrap();
  assert_eq!(report.annotated.labels[0].anchor, (25, 20));
}

#[test]
fn quitting_before_capture_runs_no_inference() {
  let model = MockDetector::new(vec![DetectResult::new(vec![square(0.0, 0.0)])]);
  let output = RecordingOutput::default();
  let capture = InteractiveCapture::new(ScriptedPreview {
    keys: [None, Some('q' as i32)].into_iter().collect(),
  });

  let report = CaptureCountTask::new(capture, CountTask::default())
    .run_task(camera(10), &model, &output)
    .unwrap();

  assert!(report.is_none());
  assert_eq!(model.calls.get(), 0);
  assert!(output.counts.borrow().is_empty());
}

#[test]
fn capture_key_counts_the_frozen_frame() {
  let model = MockDetector::new(vec![DetectResult::new(vec![
    square(0.0, 0.0),
    square(30.0, 30.0),
  ])]);
  let output = RecordingOutput::default();
  let capture = InteractiveCapture::new(ScriptedPreview {
    keys: [None, None, None, Some(32)].into_iter().collect(),
  });

  let report = CaptureCountTask::new(capture, CountTask::default())
    .run_task(camera(10), &model, &output)
    .unwrap()
    .unwrap();

  assert_eq!(model.calls.get(), 1);
  assert_eq!(model.seen_pixel.get(), Some(3));
  assert_eq!(report.total(), 2);
  assert_eq!(*output.counts.borrow(), vec![2]);
}

#[test]
fn camera_ending_before_capture_is_an_error() {
  let model = MockDetector::new(vec![]);
  let capture = InteractiveCapture::new(ScriptedPreview {
    keys: VecDeque::new(),
  });
  let result = CaptureCountTask::new(capture, CountTask::default()).run_task(
    camera(2),
    &model,
    RecordingOutput::default(),
  );
  assert!(result.is_err());
  assert_eq!(model.calls.get(), 0);
}

#[cfg(all(feature = "read_image_file", feature = "record_output"))]
#[test]
fn image_file_to_record_with_replayed_model() {
  use jishu::{
    FromUrl,
    input::ImageFileInput,
    model::ModelWrapper,
    output::OutputWrapper,
  };
  use url::Url;

  let dir = tempfile::tempdir().unwrap();
  let image_path = dir.path().join("boxes4.png");
  RgbImage::from_pixel(80, 60, Rgb([200, 200, 200]))
    .save(&image_path)
    .unwrap();

  let results_path = dir.path().join("results.json");
  std::fs::write(
    &results_path,
    r#"[
      { "obb": [
        { "points": [[5,5],[25,5],[25,25],[5,25]], "confidence": 0.8 },
        { "points": [[40,10],[60,10],[60,30],[40,30]], "confidence": 0.1 }
      ] },
      { "obb": null },
      { "obb": [ { "xyxy": [30,35,70,55], "confidence": 0.3 } ] }
    ]"#,
  )
  .unwrap();

  let report_path = dir.path().join("out/report.json");
  let url = |s: String| Url::parse(&s).unwrap();

  let input = ImageFileInput::from_url(&url(format!("image://{}", image_path.display()))).unwrap();
  let model = ModelWrapper::from_url(&url(format!("replay://{}", results_path.display()))).unwrap();
  let output = OutputWrapper::from_url(&url(format!("record://{}", report_path.display()))).unwrap();

  let report = CountTask::new(Draw::new(Geometry::Rotated))
    .run_task(input, model, output)
    .unwrap();
  assert_eq!(report.total(), 2);

  let text = std::fs::read_to_string(&report_path).unwrap();
  let value: serde_json::Value = serde_json::from_str(&text).unwrap();
  assert_eq!(value["total_count"], 2);
  assert_eq!(value["detections"][1]["anchor"], serde_json::json!([35, 25]));
  assert!(dir.path().join("out/report.png").exists());
}
