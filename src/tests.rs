#[cfg(test)]
mod integration_tests {
    use crate::test_support::{FakeBrowser, PageSetup};
    use crate::{
        CaptureError, CaptureMode, CaptureOrchestrator, CaptureRequest, Config, ErrorSeverity,
        ImageOptions, Point, ResizeFailure, ScaleMethod, ScrollPositionProvider, Size,
        ViewportSizer,
    };
    use std::time::Duration;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.sizer.settle_delay = Duration::ZERO;
        config
    }

    #[tokio::test]
    async fn test_size_then_capture_full_page() {
        let config = fast_config();
        let browser = FakeBrowser::new(PageSetup {
            window: Size::new(800, 600),
            ..Default::default()
        });

        let report = ViewportSizer::new(&browser, config.sizer.clone())
            .set_viewport_size(config.viewport.size())
            .await
            .unwrap();
        assert_eq!(report.resize_requests, 1);
        assert_eq!(browser.viewport(), Size::new(1024, 768));

        let position = ScrollPositionProvider::new(&browser);
        let output = CaptureOrchestrator::new(&browser, &position)
            .with_settings(config.capture.clone())
            .with_image_options(config.image)
            .with_cut_provider(&config.cut)
            .with_scale_method(config.scale)
            .capture(&CaptureRequest::default())
            .await
            .unwrap();

        assert_eq!(output.image.position(), Point::ZERO);
        assert_eq!(
            output.image.into_image().unwrap().into_rgba8(),
            *browser.content()
        );
    }

    #[tokio::test]
    async fn test_fitting_page_is_never_decoded() {
        let browser = FakeBrowser::new(PageSetup {
            page: Size::new(1024, 768),
            ..Default::default()
        });
        let position = ScrollPositionProvider::new(&browser);
        let output = CaptureOrchestrator::new(&browser, &position)
            .capture(&CaptureRequest::default())
            .await
            .unwrap();

        assert_eq!(output.image.size().unwrap(), Size::new(1024, 768));
        assert_eq!(output.image.decode_count(), 0);
        assert!(!output.image.to_bytes().unwrap().is_empty());
        assert_eq!(output.image.encode_count(), 0);
    }

    #[tokio::test]
    async fn test_tiling_needs_decoding() {
        let browser = FakeBrowser::new(PageSetup::default());
        let position = ScrollPositionProvider::new(&browser);
        let result = CaptureOrchestrator::new(&browser, &position)
            .with_image_options(ImageOptions {
                decoding_enabled: false,
            })
            .capture(&CaptureRequest::default())
            .await;

        assert!(matches!(result, Err(CaptureError::DecodingDisabled)));
        assert_eq!(browser.overflow(), ("auto".to_string(), String::new()));
    }

    #[tokio::test]
    async fn test_fixed_scale_matches_auto() {
        let browser = FakeBrowser::new(PageSetup {
            device_pixel_ratio: 2.0,
            page: Size::new(1024, 1200),
            ..Default::default()
        });
        let position = ScrollPositionProvider::new(&browser);
        let request = CaptureRequest {
            mode: CaptureMode::FullPage,
            hide_scrollbars: false,
        };

        let auto = CaptureOrchestrator::new(&browser, &position)
            .capture(&request)
            .await
            .unwrap();
        let fixed = CaptureOrchestrator::new(&browser, &position)
            .with_scale_method(ScaleMethod::Fixed(0.5))
            .capture(&request)
            .await
            .unwrap();

        assert_eq!(auto.image.size().unwrap(), Size::new(1024, 1200));
        assert_eq!(fixed.image.size().unwrap(), auto.image.size().unwrap());
        assert_eq!(fixed.tiles, auto.tiles);
    }

    #[tokio::test]
    async fn test_locked_window_still_captures() {
        let config = fast_config();
        let browser = FakeBrowser::new(PageSetup {
            window: Size::new(800, 600),
            window_locked: true,
            ..Default::default()
        });

        let err = ViewportSizer::new(&browser, config.sizer.clone())
            .set_viewport_size(config.viewport.size())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            CaptureError::ResizeUnachievable {
                reason: ResizeFailure::MechanismUnusable,
                ..
            }
        ));

        // Capture proceeds at whatever viewport the window allows
        let position = ScrollPositionProvider::new(&browser);
        let output = CaptureOrchestrator::new(&browser, &position)
            .capture(&CaptureRequest::default())
            .await
            .unwrap();
        assert_eq!(output.viewport, Size::new(750, 500));
        assert_eq!(output.image.size().unwrap(), Size::new(1024, 2500));
    }

    #[test]
    fn test_error_recoverable() {
        assert!(CaptureError::MeasurementUnavailable("test".to_string()).is_recoverable());
        assert!(CaptureError::ScrollFailure {
            requested: Point::new(0, 100),
            achieved: Point::ZERO,
        }
        .is_recoverable());
        assert!(!CaptureError::Cancelled.is_recoverable());
        assert!(!CaptureError::Decode("test".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_severity() {
        assert!(matches!(
            CaptureError::MeasurementUnavailable("test".to_string()).severity(),
            ErrorSeverity::Low
        ));
        assert!(matches!(
            CaptureError::Decode("test".to_string()).severity(),
            ErrorSeverity::High
        ));
    }
}
